//! Resource-server configuration
//!
//! Loaded once at startup, validated, then shared read-only. Files may be
//! TOML, YAML or JSON; `OAUTH_*` environment variables override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable prefix (`OAUTH_ISSUER`, `OAUTH_JWKS_URL`, ...)
pub const ENV_PREFIX: &str = "OAUTH";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// A required value is missing or malformed
    #[error("{0}")]
    Invalid(String),
}

/// OAuth 2.1 resource-server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Gate requests behind bearer-token authentication
    pub enabled: bool,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` entry; also the protected-resource identifier
    pub audience: String,
    /// Identity provider key-set URL
    pub jwks_url: String,
    /// Serve `POST /oauth/register`
    pub dynamic_registration: bool,
    /// Authorization server advertised alongside the issuer
    pub authorization_server: Option<String>,
    /// Refuse plain-HTTP requests from non-loopback hosts
    pub require_https: bool,
    /// Advertised in authorization-server metadata when set
    pub token_introspection_url: Option<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            issuer: String::new(),
            audience: String::new(),
            jwks_url: String::new(),
            dynamic_registration: false,
            authorization_server: None,
            require_https: true,
            token_introspection_url: None,
        }
    }
}

impl OAuthConfig {
    /// Load from a file, with `OAUTH_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unknown extension, or
    /// does not deserialize.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };
        let name = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;

        let config = Config::builder()
            .add_source(File::new(name, format))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from `OAUTH_*` environment variables only
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder().add_source(environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Startup validation
    ///
    /// # Errors
    ///
    /// Fails if OAuth is disabled, or if the issuer, audience or key-set URL
    /// is missing, or if the key-set URL is not an absolute URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Err(ConfigError::Invalid("OAuth is not enabled".into()));
        }
        if self.issuer.is_empty() {
            return Err(ConfigError::Invalid(
                "oauth-issuer is required when OAuth is enabled".into(),
            ));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Invalid(
                "oauth-audience is required when OAuth is enabled".into(),
            ));
        }
        if self.jwks_url.is_empty() {
            return Err(ConfigError::Invalid(
                "oauth-jwks-url is required when OAuth is enabled".into(),
            ));
        }
        Url::parse(&self.jwks_url)
            .map_err(|e| ConfigError::Invalid(format!("oauth-jwks-url is not a valid URL: {e}")))?;

        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
