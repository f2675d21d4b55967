//! JWKS (JSON Web Key Set) fetching and caching
//!
//! One key set is shared by every validation. Readers take the shared lock and
//! return the cached set while it is fresh; a miss takes the exclusive lock,
//! fetches the whole document and replaces the entry in one step. There is no
//! stale-on-error fallback and no retry: a failed fetch fails the request.
//!
//! The refresh runs on its own task. A caller that gives up while it is in
//! flight does not cancel it, so the result still lands in the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// How long a fetched key set stays fresh
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Upper bound on a single key-set fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with key-set requests
pub const USER_AGENT: &str = "mcp-devtools OAuth2 client";

/// JWKS errors
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// HTTP request to the JWKS endpoint failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JWKS endpoint answered with a non-success status
    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// JWKS body was not a key-set document
    #[error("Invalid JWKS response: {0}")]
    InvalidResponse(String),

    /// Requested key ID not present in the key set
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key ID that was not found
        kid: String,
    },

    /// Only RSA keys are accepted
    #[error("Unsupported key type: {kty}")]
    UnsupportedKeyType {
        /// The unsupported key type
        kty: String,
    },

    /// Key parameters missing or not valid base64url
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// The background refresh task panicked or was aborted
    #[error("JWKS refresh task failed: {0}")]
    Refresh(#[from] tokio::task::JoinError),
}

/// JSON Web Key (RFC 7517)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, `oct`, `OKP`)
    pub kty: String,

    /// Public key use (`sig`, `enc`)
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Build an RSA verification key from the modulus and exponent
    ///
    /// # Errors
    ///
    /// Fails for non-RSA keys and for missing or undecodable parameters.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, JwksError> {
        if self.kty != "RSA" {
            return Err(JwksError::UnsupportedKeyType {
                kty: self.kty.clone(),
            });
        }

        let n = rsa_component(self.n.as_deref(), "n")?;
        let e = rsa_component(self.e.as_deref(), "e")?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|err| JwksError::InvalidKeyFormat(format!("Failed to create RSA key: {err}")))
    }
}

/// Strip optional padding and check the value is base64url
fn rsa_component<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, JwksError> {
    let value = value
        .map(|v| v.trim_end_matches('='))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| JwksError::InvalidKeyFormat(format!("RSA key missing '{name}' parameter")))?;

    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|err| JwksError::InvalidKeyFormat(format!("RSA '{name}' parameter: {err}")))?;

    Ok(value)
}

/// JSON Web Key Set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by ID
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

#[derive(Debug)]
struct CacheEntry {
    keys: Arc<JwkSet>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Fetches and time-caches the identity provider's key set
#[derive(Debug)]
pub struct JwksClient {
    url: Arc<str>,
    http: reqwest::Client,
    ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
}

impl JwksClient {
    /// Create a client for `url` with the default five minute TTL
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::Http`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, JwksError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            url: Arc::from(url.into()),
            http,
            ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Override the cache TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The key-set URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The current key set, fetching it if the cache is empty or stale
    ///
    /// # Errors
    ///
    /// Returns the fetch error when a refresh is needed and fails.
    pub async fn snapshot(&self) -> Result<Arc<JwkSet>, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref()
                && entry.is_fresh()
            {
                debug!(url = %self.url, "JWKS cache hit");
                return Ok(Arc::clone(&entry.keys));
            }
        }

        self.refresh().await
    }

    /// Resolve a verification key by key ID
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::KeyNotFound`] when the current set lacks `kid`,
    /// or the fetch and key-construction errors.
    pub async fn resolve(&self, kid: &str) -> Result<DecodingKey, JwksError> {
        let keys = self.snapshot().await?;
        let jwk = keys.find(kid).ok_or_else(|| JwksError::KeyNotFound {
            kid: kid.to_string(),
        })?;
        jwk.to_decoding_key()
    }

    /// Drop the cached key set so the next lookup refetches
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        info!(url = %self.url, "JWKS cache invalidated");
    }

    /// Fetch on a detached task and wait for it
    ///
    /// Concurrent refreshes queue on the write lock; only the first one
    /// fetches, the rest find the fresh entry it stored.
    async fn refresh(&self) -> Result<Arc<JwkSet>, JwksError> {
        let task = refresh_cache(
            Arc::clone(&self.url),
            self.http.clone(),
            self.ttl,
            Arc::clone(&self.cache),
        );
        tokio::spawn(task).await?
    }
}

async fn refresh_cache(
    url: Arc<str>,
    http: reqwest::Client,
    ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
) -> Result<Arc<JwkSet>, JwksError> {
    let mut cache = cache.write().await;

    // Another task may have refreshed while we waited for the lock
    if let Some(entry) = cache.as_ref()
        && entry.is_fresh()
    {
        return Ok(Arc::clone(&entry.keys));
    }

    let keys = Arc::new(fetch(&http, &url).await?);
    *cache = Some(CacheEntry {
        keys: Arc::clone(&keys),
        expires_at: Instant::now() + ttl,
    });

    info!(url = %url, key_count = keys.keys.len(), "JWKS fetched and cached");
    Ok(keys)
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<JwkSet, JwksError> {
    debug!(url = %url, "Fetching JWKS");

    let response = http
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            error!(url = %url, error = %e, "JWKS request failed");
            JwksError::Http(e)
        })?;

    let status = response.status();
    if !status.is_success() {
        error!(url = %url, status = status.as_u16(), "JWKS endpoint returned error status");
        return Err(JwksError::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| {
        error!(url = %url, error = %e, "JWKS body is not a key set");
        JwksError::InvalidResponse(e.to_string())
    })
}
