//! Resource server
//!
//! Ties the key-set cache, token validator, metadata provider and client
//! registrar together behind [`ResourceServer::authenticate_request`], the
//! HTTP gate and the discovery router.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "middleware")]
use axum::Router;
use http::request::Parts;
use http::header;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::challenge::WwwAuthenticateBuilder;
use crate::config::{ConfigError, OAuthConfig};
use crate::error::{ErrorCode, OAuth2Error};
use crate::jwt::{JwkSet, JwksClient, JwksError, JwtValidator, TokenClaims, TokenValidator, ValidationError};
use crate::metadata::{
    AUTHORIZATION_SERVER_PATH, ConfigMetadataProvider, JWKS_PATH, MetadataProvider,
    PROTECTED_RESOURCE_PATH, REGISTRATION_PATH,
};
use crate::registration::{ClientRegistrar, InMemoryRegistrar, RegistrarConfig};
#[cfg(feature = "middleware")]
use crate::tower::{GateLayer, RequireScopeLayer};

/// Errors building a [`ResourceServer`]
#[derive(Debug, Error)]
pub enum ResourceServerError {
    /// Configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The key-set HTTP client could not be built
    #[error("failed to initialize key-set client: {0}")]
    Jwks(#[from] JwksError),
}

/// Outcome of authenticating one request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationResult {
    /// Whether the request carried an acceptable token
    pub authenticated: bool,
    /// Validated claims; present iff authenticated
    pub claims: Option<TokenClaims>,
    /// OAuth error body; present iff not authenticated
    pub error: Option<OAuth2Error>,
    /// Pre-rendered `WWW-Authenticate` value for the failure response
    pub www_authenticate: Option<String>,
}

impl AuthenticationResult {
    fn success(claims: TokenClaims) -> Self {
        Self {
            authenticated: true,
            claims: Some(claims),
            error: None,
            www_authenticate: None,
        }
    }

    fn failure(error: OAuth2Error, www_authenticate: String) -> Self {
        Self {
            authenticated: false,
            claims: None,
            error: Some(error),
            www_authenticate: Some(www_authenticate),
        }
    }
}

/// User-facing description for a rejected token
///
/// Only these four strings ever reach the client; the full cause is logged.
pub fn describe_validation_error(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::Expired => "The access token has expired",
        ValidationError::InvalidAudience { .. } => "The access token audience is invalid",
        ValidationError::InvalidIssuer { .. } => "The access token issuer is invalid",
        _ => "The access token is invalid",
    }
}

/// OAuth 2.1 resource server
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct ResourceServer {
    config: Arc<OAuthConfig>,
    base_url: Arc<str>,
    keys: Arc<JwksClient>,
    validator: Arc<dyn TokenValidator>,
    metadata: Arc<dyn MetadataProvider>,
    registrar: Option<Arc<dyn ClientRegistrar>>,
    challenge: WwwAuthenticateBuilder,
}

impl fmt::Debug for ResourceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceServer")
            .field("base_url", &self.base_url)
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("dynamic_registration", &self.config.dynamic_registration)
            .finish_non_exhaustive()
    }
}

impl ResourceServer {
    /// Build a resource server from validated configuration
    ///
    /// `base_url` is the public origin of this server; it is the realm of
    /// every challenge and the root of the advertised endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceServerError::Config`] when the configuration is
    /// incomplete, or [`ResourceServerError::Jwks`] when the HTTP client
    /// cannot be built.
    pub fn new(config: OAuthConfig, base_url: impl Into<String>) -> Result<Self, ResourceServerError> {
        config.validate()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let keys = Arc::new(JwksClient::new(config.jwks_url.clone())?);
        let validator = JwtValidator::new(
            config.issuer.clone(),
            config.audience.clone(),
            Arc::clone(&keys),
        );
        let metadata = ConfigMetadataProvider::new(config.clone(), base_url.clone());
        let registrar: Option<Arc<dyn ClientRegistrar>> = config
            .dynamic_registration
            .then(|| -> Arc<dyn ClientRegistrar> {
                Arc::new(InMemoryRegistrar::new(RegistrarConfig::default()))
            });
        let challenge =
            WwwAuthenticateBuilder::new(format!("{base_url}{PROTECTED_RESOURCE_PATH}"));

        info!(
            issuer = %config.issuer,
            audience = %config.audience,
            jwks_url = %config.jwks_url,
            dynamic_registration = config.dynamic_registration,
            require_https = config.require_https,
            "OAuth resource server initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            base_url: base_url.into(),
            keys,
            validator: Arc::new(validator),
            metadata: Arc::new(metadata),
            registrar,
            challenge,
        })
    }

    /// Replace the token validator
    #[must_use]
    pub fn with_token_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replace the metadata provider
    #[must_use]
    pub fn with_metadata_provider(mut self, metadata: impl MetadataProvider + 'static) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    /// Replace the client registrar
    ///
    /// The registration endpoint is still only served when dynamic
    /// registration is enabled in the configuration.
    #[must_use]
    pub fn with_registrar(mut self, registrar: impl ClientRegistrar + 'static) -> Self {
        self.registrar = Some(Arc::new(registrar));
        self
    }

    /// The validated configuration this server was built from
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Public origin, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Source of the discovery documents
    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    /// The registrar, when dynamic registration is enabled
    pub fn registrar(&self) -> Option<&Arc<dyn ClientRegistrar>> {
        self.registrar
            .as_ref()
            .filter(|_| self.config.dynamic_registration)
    }

    /// Current identity-provider key set, fetched if stale
    ///
    /// # Errors
    ///
    /// Returns the key-set fetch error.
    pub async fn key_set(&self) -> Result<Arc<JwkSet>, JwksError> {
        self.keys.snapshot().await
    }

    /// Drop the cached key set, e.g. after a detected key rotation
    pub async fn invalidate_keys(&self) {
        self.keys.invalidate().await;
    }

    /// Authenticate a request from its head
    pub async fn authenticate_request(&self, parts: &Parts) -> AuthenticationResult {
        if self.config.require_https && !is_https(parts) && !is_loopback(parts) {
            debug!(uri = %parts.uri, "Rejected plain-HTTP request");
            return self.reject(ErrorCode::InvalidRequest, "HTTPS is required");
        }

        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            debug!("Missing Authorization header");
            return self.reject(ErrorCode::InvalidRequest, "Authorization header is required");
        };

        let token = match value.to_str().ok().and_then(extract_bearer_token) {
            Some(token) => token,
            None if value.is_empty() => {
                debug!("Empty Authorization header");
                return self.reject(ErrorCode::InvalidRequest, "Authorization header is required");
            }
            None => {
                debug!("Authorization header is not a bearer token");
                return self.reject(ErrorCode::InvalidRequest, "Invalid authorization format");
            }
        };

        match self.validator.validate(token).await {
            Ok(claims) => {
                debug!(
                    client_id = claims.client_id.as_deref().unwrap_or_default(),
                    sub = claims.sub.as_deref().unwrap_or_default(),
                    scope = claims.scope.as_deref().unwrap_or_default(),
                    "Request authenticated"
                );
                AuthenticationResult::success(claims)
            }
            Err(e) => {
                if matches!(e, ValidationError::Key(_)) {
                    warn!(error = %e, "Token rejected during key resolution");
                } else {
                    debug!(error = %e, "Token rejected");
                }
                self.reject(ErrorCode::InvalidToken, describe_validation_error(&e))
            }
        }
    }

    fn reject(&self, code: ErrorCode, description: &str) -> AuthenticationResult {
        let header = self
            .challenge
            .build(&self.base_url, code.as_str(), description);
        AuthenticationResult::failure(OAuth2Error::new(code, description), header)
    }

    /// Challenge for a scope failure on an authenticated request
    #[cfg(feature = "middleware")]
    pub(crate) fn scope_challenge(&self, description: &str) -> String {
        self.challenge.build(
            &self.base_url,
            ErrorCode::InsufficientScope.as_str(),
            description,
        )
    }

    /// Paths served without authentication
    pub fn is_bypass_path(&self, path: &str) -> bool {
        matches!(path, AUTHORIZATION_SERVER_PATH | PROTECTED_RESOURCE_PATH | JWKS_PATH)
            || (self.config.dynamic_registration && path == REGISTRATION_PATH)
    }

    /// Layer that authenticates every request outside the bypass paths
    #[cfg(feature = "middleware")]
    pub fn gate(&self) -> GateLayer {
        GateLayer::new(self.clone())
    }

    /// Layer that answers 403 unless the attached claims grant `scope`
    ///
    /// Must sit inside [`gate`](Self::gate).
    #[cfg(feature = "middleware")]
    pub fn require_scope(&self, scope: impl Into<String>) -> RequireScopeLayer {
        RequireScopeLayer::new(self.clone(), scope)
    }

    /// Discovery, key-set and (when enabled) registration routes
    #[cfg(feature = "middleware")]
    pub fn routes(&self) -> Router {
        crate::routes::router(self.clone())
    }
}

/// Token from `Bearer <token>`; `None` for any other scheme or an empty token
fn extract_bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

fn is_https(parts: &Parts) -> bool {
    parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn is_loopback(parts: &Parts) -> bool {
    let authority = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()));

    authority.is_some_and(|authority| {
        let host = host_without_port(authority);
        host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1"
    })
}

fn host_without_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Accepts exactly one token
    struct FixedValidator;

    #[async_trait]
    impl TokenValidator for FixedValidator {
        async fn validate(&self, token: &str) -> Result<TokenClaims, ValidationError> {
            match token {
                "good" => Ok(TokenClaims {
                    sub: Some("user-1".into()),
                    scope: Some("read".into()),
                    ..TokenClaims::default()
                }),
                "expired" => Err(ValidationError::Expired),
                "wrong-aud" => Err(ValidationError::InvalidAudience {
                    expected: "api".into(),
                }),
                "wrong-iss" => Err(ValidationError::InvalidIssuer {
                    expected: "a".into(),
                    actual: "b".into(),
                }),
                _ => Err(ValidationError::InvalidSignature),
            }
        }
    }

    fn config() -> OAuthConfig {
        OAuthConfig {
            enabled: true,
            issuer: "https://auth.example.com".into(),
            audience: "api".into(),
            jwks_url: "https://auth.example.com/jwks".into(),
            ..OAuthConfig::default()
        }
    }

    fn server(config: OAuthConfig) -> ResourceServer {
        ResourceServer::new(config, "https://mcp.example.com/")
            .unwrap()
            .with_token_validator(FixedValidator)
    }

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn description(result: &AuthenticationResult) -> Option<&str> {
        result.error.as_ref()?.error_description.as_deref()
    }

    #[test]
    fn test_new_rejects_incomplete_config() {
        let err = ResourceServer::new(OAuthConfig::default(), "https://mcp").unwrap_err();
        assert_eq!(err.to_string(), "OAuth is not enabled");

        let config = OAuthConfig {
            issuer: String::new(),
            ..config()
        };
        assert!(matches!(
            ResourceServer::new(config, "https://mcp"),
            Err(ResourceServerError::Config(_))
        ));
    }

    #[test]
    fn test_accessors() {
        let server = server(config());
        assert_eq!(server.base_url(), "https://mcp.example.com");
        assert_eq!(server.config().issuer, config().issuer);
        assert_eq!(
            server.metadata().authorization_server_metadata().jwks_uri,
            "https://mcp.example.com/.well-known/jwks.json"
        );
    }

    #[tokio::test]
    async fn test_success() {
        let result = server(config())
            .authenticate_request(&parts("https://mcp.example.com/x", &[("authorization", "Bearer good")]))
            .await;

        assert!(result.authenticated);
        assert_eq!(result.claims.unwrap().sub.as_deref(), Some("user-1"));
        assert!(result.error.is_none());
        assert!(result.www_authenticate.is_none());
    }

    #[tokio::test]
    async fn test_https_required() {
        let server = server(config());

        let result = server
            .authenticate_request(&parts("/x", &[("host", "mcp.example.com"), ("authorization", "Bearer good")]))
            .await;
        assert!(!result.authenticated);
        assert_eq!(description(&result), Some("HTTPS is required"));
        assert_eq!(result.error.as_ref().map(|e| e.error), Some(ErrorCode::InvalidRequest));

        for host in ["localhost:8080", "127.0.0.1", "[::1]:3000", "::1"] {
            let result = server
                .authenticate_request(&parts("/x", &[("host", host), ("authorization", "Bearer good")]))
                .await;
            assert!(result.authenticated, "{host}");
        }

        let result = server
            .authenticate_request(&parts(
                "/x",
                &[
                    ("host", "mcp.example.com"),
                    ("x-forwarded-proto", "https"),
                    ("authorization", "Bearer good"),
                ],
            ))
            .await;
        assert!(result.authenticated);
    }

    #[tokio::test]
    async fn test_https_not_required() {
        let config = OAuthConfig {
            require_https: false,
            ..config()
        };
        let result = server(config)
            .authenticate_request(&parts("/x", &[("host", "mcp.example.com"), ("authorization", "Bearer good")]))
            .await;
        assert!(result.authenticated);
    }

    #[tokio::test]
    async fn test_header_shape() {
        let server = server(config());
        let uri = "https://mcp.example.com/x";

        let result = server.authenticate_request(&parts(uri, &[])).await;
        assert_eq!(description(&result), Some("Authorization header is required"));

        for value in ["Basic dXNlcjpwYXNz", "Bearer ", "bearer good", "Bearergood"] {
            let result = server
                .authenticate_request(&parts(uri, &[("authorization", value)]))
                .await;
            assert_eq!(description(&result), Some("Invalid authorization format"), "{value}");
            assert_eq!(result.error.as_ref().map(|e| e.error), Some(ErrorCode::InvalidRequest));
        }
    }

    #[tokio::test]
    async fn test_token_error_classification() {
        let server = server(config());
        let cases = [
            ("expired", "The access token has expired"),
            ("wrong-aud", "The access token audience is invalid"),
            ("wrong-iss", "The access token issuer is invalid"),
            ("forged", "The access token is invalid"),
        ];

        for (token, expected) in cases {
            let auth = format!("Bearer {token}");
            let result = server
                .authenticate_request(&parts("https://mcp.example.com/x", &[("authorization", &auth)]))
                .await;

            assert!(!result.authenticated);
            assert!(result.claims.is_none());
            assert_eq!(result.error.as_ref().map(|e| e.error), Some(ErrorCode::InvalidToken));
            assert_eq!(description(&result), Some(expected));

            let header = result.www_authenticate.unwrap();
            assert!(header.starts_with("Bearer realm=\"https://mcp.example.com\""), "{header}");
            assert!(header.contains("error=\"invalid_token\""));
            assert!(header.contains(&format!("error_description=\"{expected}\"")));
            assert!(header.contains(
                "resource_metadata_url=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
            ));
        }
    }

    #[test]
    fn test_bypass_paths() {
        let plain = server(config());
        assert!(plain.is_bypass_path("/.well-known/oauth-authorization-server"));
        assert!(plain.is_bypass_path("/.well-known/oauth-protected-resource"));
        assert!(plain.is_bypass_path("/.well-known/jwks.json"));
        assert!(!plain.is_bypass_path("/oauth/register"));
        assert!(!plain.is_bypass_path("/.well-known/oauth-protected-resource/extra"));
        assert!(!plain.is_bypass_path("/api"));
        assert!(plain.registrar().is_none());

        let with_registration = server(OAuthConfig {
            dynamic_registration: true,
            ..config()
        });
        assert!(with_registration.is_bypass_path("/oauth/register"));
        assert!(with_registration.registrar().is_some());
    }

    #[test]
    fn test_host_without_port() {
        assert_eq!(host_without_port("localhost:8080"), "localhost");
        assert_eq!(host_without_port("localhost"), "localhost");
        assert_eq!(host_without_port("[::1]:8080"), "::1");
        assert_eq!(host_without_port("[::1]"), "::1");
        assert_eq!(host_without_port("::1"), "::1");
        assert_eq!(host_without_port("example.com:443"), "example.com");
    }
}
