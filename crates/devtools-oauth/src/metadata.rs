//! Discovery documents
//!
//! Authorization Server Metadata (RFC 8414) and Protected Resource Metadata
//! (RFC 9728). Both are derived from configuration alone and never change
//! for the life of the process.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::OAuthConfig;

/// Well-known path of the authorization-server metadata document
pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
/// Well-known path of the protected-resource metadata document
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
/// Well-known path of the key-set document
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
/// Dynamic client registration endpoint
pub const REGISTRATION_PATH: &str = "/oauth/register";

/// RFC 8414 authorization-server metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

/// RFC 9728 protected-resource metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    pub bearer_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
    pub resource_signing_alg_values_supported: Vec<String>,
}

/// Source of the two discovery documents
pub trait MetadataProvider: Send + Sync {
    fn authorization_server_metadata(&self) -> AuthorizationServerMetadata;
    fn protected_resource_metadata(&self) -> ProtectedResourceMetadata;
}

/// Builds the documents from [`OAuthConfig`] and the public base URL
#[derive(Debug, Clone)]
pub struct ConfigMetadataProvider {
    config: OAuthConfig,
    base_url: String,
}

impl ConfigMetadataProvider {
    pub fn new(config: OAuthConfig, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { config, base_url }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

/// `{issuer}/.well-known/jwks.json`, keeping any issuer path and query
fn jwks_uri_from_issuer(issuer: &str) -> Option<String> {
    let mut url = Url::parse(issuer).ok()?;
    let path = format!("{}{JWKS_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Some(url.into())
}

impl MetadataProvider for ConfigMetadataProvider {
    fn authorization_server_metadata(&self) -> AuthorizationServerMetadata {
        let base = &self.base_url;

        AuthorizationServerMetadata {
            issuer: self.config.issuer.clone(),
            authorization_endpoint: format!("{base}/oauth/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            jwks_uri: format!("{base}{JWKS_PATH}"),
            registration_endpoint: self
                .config
                .dynamic_registration
                .then(|| format!("{base}{REGISTRATION_PATH}")),
            introspection_endpoint: self
                .config
                .token_introspection_url
                .clone()
                .filter(|u| !u.is_empty()),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code", "refresh_token"]),
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
                "none",
            ]),
            code_challenge_methods_supported: strings(&["S256", "plain"]),
            scopes_supported: strings(&["openid", "profile", "email"]),
        }
    }

    fn protected_resource_metadata(&self) -> ProtectedResourceMetadata {
        let config = &self.config;

        let resource = if config.audience.is_empty() {
            self.base_url.clone()
        } else {
            config.audience.clone()
        };

        let mut authorization_servers = Vec::new();
        if !config.issuer.is_empty() {
            authorization_servers.push(config.issuer.clone());
        }
        if let Some(server) = config.authorization_server.as_deref()
            && !server.is_empty()
            && server != config.issuer
        {
            authorization_servers.push(server.to_string());
        }

        let jwks_uri = if config.jwks_url.is_empty() {
            (!config.issuer.is_empty())
                .then(|| jwks_uri_from_issuer(&config.issuer))
                .flatten()
        } else {
            Some(config.jwks_url.clone())
        };

        ProtectedResourceMetadata {
            resource,
            authorization_servers,
            jwks_uri,
            bearer_methods_supported: strings(&["header"]),
            resource_documentation: Some(format!("{}/docs", self.base_url)),
            resource_signing_alg_values_supported: strings(&["RS256", "RS384", "RS512"]),
        }
    }
}
