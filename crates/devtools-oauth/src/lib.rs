//! # devtools-oauth
//!
//! OAuth 2.1 resource-server core for the developer-tools server. Every
//! inbound request is checked for a valid, scoped bearer token; the
//! discovery and dynamic-registration surfaces an OAuth client needs to
//! obtain one are served alongside.
//!
//! ## Architecture
//!
//! - [`jwt`] - key-set cache and RS256/384/512 token validation
//! - [`pkce`] - PKCE challenge generation and constant-time verification
//! - [`credentials`] - random client ids, secrets, verifiers and `state`
//! - [`registration`] - RFC 7591 client registrar
//! - [`metadata`] - RFC 8414 and RFC 9728 discovery documents
//! - [`challenge`] - `WWW-Authenticate` header values
//! - [`server`] - [`ResourceServer`], which ties the above together
//! - `tower` - the gate and scope-gate middleware (`middleware` feature)
//! - [`context`] - typed access to the claims the gate attaches
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use devtools_oauth::{Authenticated, OAuthConfig, ResourceServer};
//!
//! async fn whoami(claims: Authenticated) -> String {
//!     claims.sub.clone().unwrap_or_default()
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OAuthConfig::from_file("oauth.toml")?;
//! let server = ResourceServer::new(config, "https://mcp.example.com")?;
//!
//! let app: Router = Router::new()
//!     .route("/whoami", get(whoami))
//!     .route("/admin", get(whoami).layer(server.require_scope("admin")))
//!     .merge(server.routes())
//!     .layer(server.gate());
//! # let _ = app;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `middleware` (default) - the tower gate layers and
//!   [`ResourceServer::routes`]. Without it the crate still validates tokens
//!   through [`ResourceServer::authenticate_request`].
//!
//! ## Standards
//!
//! - **RFC 6750** - Bearer token usage and `WWW-Authenticate` challenges
//! - **RFC 7517** - JSON Web Key sets
//! - **RFC 7519** - JSON Web Token
//! - **RFC 7591** - Dynamic Client Registration
//! - **RFC 7636** - PKCE
//! - **RFC 8414** - Authorization Server Metadata
//! - **RFC 8707** - Resource Indicators (multi-valued audience)
//! - **RFC 9728** - Protected Resource Metadata
//!
//! The authorization and token endpoints advertised in the metadata belong to
//! the upstream identity provider; this crate only validates the tokens it
//! issues.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod challenge;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod metadata;
pub mod pkce;
pub mod registration;
#[cfg(feature = "middleware")]
mod routes;
pub mod server;
#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use challenge::WwwAuthenticateBuilder;
#[doc(inline)]
pub use config::{ConfigError, OAuthConfig};
#[doc(inline)]
pub use context::{Authenticated, ScopeError, claims, has_scope, require_scope};
#[doc(inline)]
pub use error::{ErrorCode, OAuth2Error};
#[doc(inline)]
pub use jwt::{JwkSet, JwksClient, JwtValidator, TokenClaims, TokenValidator, ValidationError};
#[doc(inline)]
pub use metadata::{
    AuthorizationServerMetadata, ConfigMetadataProvider, MetadataProvider,
    ProtectedResourceMetadata,
};
#[doc(inline)]
pub use pkce::{PkceChallenge, PkceMethod};
#[doc(inline)]
pub use registration::{
    ClientRegistrar, InMemoryRegistrar, RegistrarConfig, RegistrationError, RegistrationRequest,
    RegistrationResponse,
};
#[doc(inline)]
pub use server::{AuthenticationResult, ResourceServer, ResourceServerError};
