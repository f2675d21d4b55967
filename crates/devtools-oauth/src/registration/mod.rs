//! OAuth 2.0 Dynamic Client Registration (RFC 7591)
//!
//! - [`ClientRegistrar`] - the registration capability the resource server uses
//! - [`InMemoryRegistrar`] - process-lifetime implementation
//! - [`validate_redirect_uri`] - redirect URI rules shared by register and update
//!
//! Registration state is not durable. A restart forgets every client.

mod memory;
mod redirect;

pub use memory::InMemoryRegistrar;
pub use redirect::validate_redirect_uri;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::error::ErrorCode;

/// Grant types a client may register
pub const SUPPORTED_GRANT_TYPES: &[&str] = &["authorization_code", "refresh_token"];
/// Response types a client may register
pub const SUPPORTED_RESPONSE_TYPES: &[&str] = &["code"];
/// Token endpoint authentication methods a client may register
pub const SUPPORTED_AUTH_METHODS: &[&str] = &["client_secret_basic", "client_secret_post", "none"];

/// Registration errors
///
/// Metadata problems map to `invalid_request`, failed client
/// authentication to `invalid_client`, the rest to `server_error`.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("redirect_uris are required")]
    MissingRedirectUris,

    #[error("too many redirect URIs (max: {max})")]
    TooManyRedirectUris { max: usize },

    #[error("invalid redirect URI {uri}: {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("unsupported token endpoint auth method: {0}")]
    UnsupportedAuthMethod(String),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("invalid client credentials")]
    InvalidClientSecret,

    #[error("client secret has expired")]
    ClientSecretExpired,

    #[error("failed to generate client credentials: {0}")]
    Credential(#[from] CredentialError),
}

impl RegistrationError {
    /// OAuth error code for this failure
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidClientSecret | Self::ClientSecretExpired => ErrorCode::InvalidClient,
            Self::ClientNotFound(_) | Self::Credential(_) => ErrorCode::ServerError,
            _ => ErrorCode::InvalidRequest,
        }
    }

    /// Whether the caller's registration metadata was at fault
    pub fn is_invalid_request(&self) -> bool {
        self.error_code() == ErrorCode::InvalidRequest
    }
}

/// Client registration request (RFC 7591 §2)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationRequest {
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    /// Space-separated scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

impl RegistrationRequest {
    /// Request with the given redirect URIs and nothing else
    pub fn new<I, S>(redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            redirect_uris: redirect_uris.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    pub fn with_grant_types<I, S>(mut self, grant_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant_types = grant_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Client information response (RFC 7591 §3.2.1)
///
/// `client_secret` is only populated in the response to the registration
/// call itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_id_issued_at: i64,
    /// Zero when no secret was issued
    #[serde(default, skip_serializing_if = "is_zero")]
    pub client_secret_expires_at: i64,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

impl RegistrationResponse {
    /// Whether an issued secret has passed its expiry
    pub fn is_secret_expired(&self) -> bool {
        self.client_secret_expires_at > 0 && Utc::now().timestamp() > self.client_secret_expires_at
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Registrar policy and defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarConfig {
    pub require_redirect_uris: bool,
    pub max_redirect_uris: usize,
    pub client_secret_ttl: chrono::TimeDelta,
    pub default_grant_types: Vec<String>,
    pub default_response_types: Vec<String>,
    pub default_scope: String,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            require_redirect_uris: true,
            max_redirect_uris: 5,
            client_secret_ttl: chrono::TimeDelta::hours(24),
            default_grant_types: vec!["authorization_code".to_string()],
            default_response_types: vec!["code".to_string()],
            default_scope: "openid profile".to_string(),
        }
    }
}

impl RegistrarConfig {
    /// Check a register or update request against the registration rules
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self, request: &RegistrationRequest) -> Result<(), RegistrationError> {
        if self.require_redirect_uris && request.redirect_uris.is_empty() {
            return Err(RegistrationError::MissingRedirectUris);
        }
        if request.redirect_uris.len() > self.max_redirect_uris {
            return Err(RegistrationError::TooManyRedirectUris {
                max: self.max_redirect_uris,
            });
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri(uri)?;
        }

        if let Some(grant) = request
            .grant_types
            .iter()
            .find(|g| !SUPPORTED_GRANT_TYPES.contains(&g.as_str()))
        {
            return Err(RegistrationError::UnsupportedGrantType(grant.clone()));
        }

        if let Some(response_type) = request
            .response_types
            .iter()
            .find(|r| !SUPPORTED_RESPONSE_TYPES.contains(&r.as_str()))
        {
            return Err(RegistrationError::UnsupportedResponseType(
                response_type.clone(),
            ));
        }

        if let Some(method) = request.token_endpoint_auth_method.as_deref()
            && !method.is_empty()
            && !SUPPORTED_AUTH_METHODS.contains(&method)
        {
            return Err(RegistrationError::UnsupportedAuthMethod(method.to_string()));
        }

        Ok(())
    }
}

/// Client registration capability
///
/// The resource server holds this as a trait object so tests can swap in a
/// fake registrar.
#[async_trait]
pub trait ClientRegistrar: Send + Sync {
    /// Validate and store a new client; the response carries the only copy
    /// of the plaintext secret that will ever be returned
    async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, RegistrationError>;

    /// Look up a client; never includes the secret
    async fn get(&self, client_id: &str) -> Result<RegistrationResponse, RegistrationError>;

    /// Apply the non-empty mutable fields of `request`
    async fn update(
        &self,
        client_id: &str,
        request: RegistrationRequest,
    ) -> Result<RegistrationResponse, RegistrationError>;

    /// Remove a client
    async fn delete(&self, client_id: &str) -> Result<(), RegistrationError>;
}
