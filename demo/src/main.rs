//! Demo server with one OAuth 2.1 protected route
//!
//! ```text
//! devtools-oauth-demo \
//!     --oauth-enabled true \
//!     --oauth-issuer https://auth.example.com \
//!     --oauth-audience http://localhost:8080 \
//!     --oauth-jwks-url https://auth.example.com/.well-known/jwks.json \
//!     --oauth-dynamic-registration true
//! ```
//!
//! `GET /whoami` echoes the validated claims, `GET /admin` additionally
//! requires the `admin` scope, and the discovery documents are served
//! without authentication.

mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use devtools_oauth::{Authenticated, OAuthConfig, ResourceServer, TokenClaims};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "devtools-oauth-demo", version, about = "OAuth 2.1 protected demo server")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); OAUTH_* variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable bearer-token authentication
    #[arg(long, env = "OAUTH_ENABLED")]
    oauth_enabled: Option<bool>,

    /// Expected token issuer
    #[arg(long, env = "OAUTH_ISSUER")]
    oauth_issuer: Option<String>,

    /// Expected token audience
    #[arg(long, env = "OAUTH_AUDIENCE")]
    oauth_audience: Option<String>,

    /// Identity provider key-set URL
    #[arg(long, env = "OAUTH_JWKS_URL")]
    oauth_jwks_url: Option<String>,

    /// Serve POST /oauth/register
    #[arg(long, env = "OAUTH_DYNAMIC_REGISTRATION")]
    oauth_dynamic_registration: Option<bool>,

    /// Authorization server advertised alongside the issuer
    #[arg(long, env = "OAUTH_AUTHORIZATION_SERVER")]
    oauth_authorization_server: Option<String>,

    /// Refuse plain-HTTP requests from non-loopback hosts
    #[arg(long, env = "OAUTH_REQUIRE_HTTPS")]
    oauth_require_https: Option<bool>,

    /// Introspection endpoint advertised in metadata
    #[arg(long, env = "OAUTH_TOKEN_INTROSPECTION_URL")]
    oauth_token_introspection_url: Option<String>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, short, default_value_t = 8080)]
    port: u16,

    /// Public origin; defaults to http://{host}:{port}
    #[arg(long)]
    base_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn oauth_config(&self) -> anyhow::Result<OAuthConfig> {
        let mut config = match &self.config {
            Some(path) => OAuthConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => OAuthConfig::from_env().context("reading OAUTH_* environment")?,
        };

        if let Some(enabled) = self.oauth_enabled {
            config.enabled = enabled;
        }
        if let Some(issuer) = &self.oauth_issuer {
            config.issuer.clone_from(issuer);
        }
        if let Some(audience) = &self.oauth_audience {
            config.audience.clone_from(audience);
        }
        if let Some(jwks_url) = &self.oauth_jwks_url {
            config.jwks_url.clone_from(jwks_url);
        }
        if let Some(dynamic_registration) = self.oauth_dynamic_registration {
            config.dynamic_registration = dynamic_registration;
        }
        if let Some(server) = &self.oauth_authorization_server {
            config.authorization_server = Some(server.clone());
        }
        if let Some(require_https) = self.oauth_require_https {
            config.require_https = require_https;
        }
        if let Some(url) = &self.oauth_token_introspection_url {
            config.token_introspection_url = Some(url.clone());
        }

        Ok(config)
    }
}

fn claims_json(claims: &TokenClaims) -> Value {
    json!({
        "sub": claims.sub,
        "client_id": claims.client_id,
        "username": claims.username,
        "scope": claims.scope,
        "aud": claims.aud,
    })
}

async fn whoami(claims: Authenticated) -> Json<Value> {
    Json(claims_json(&claims))
}

async fn admin(claims: Authenticated) -> Json<Value> {
    Json(json!({ "admin": true, "claims": claims_json(&claims) }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json)?;

    let config = cli.oauth_config()?;
    let base_url = cli
        .base_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", cli.host, cli.port));
    let server = ResourceServer::new(config, base_url.clone())?;

    let app = Router::new()
        .route("/whoami", get(whoami))
        .route("/admin", get(admin).layer(server.require_scope("admin")))
        .merge(server.routes())
        .layer(server.gate())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, %base_url, "Demo server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
