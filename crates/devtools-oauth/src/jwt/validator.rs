//! Bearer-token validation
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. non-empty token
//! 2. RSA signing algorithm (RS256/RS384/RS512 only)
//! 3. key resolved from the JWKS by `kid`
//! 4. signature
//! 5. issuer, exact match (when configured)
//! 6. audience membership (when configured)
//! 7. expiry in the future
//! 8. not-before not in the future
//!
//! `jsonwebtoken` only verifies the signature here; its built-in claim checks
//! are switched off so the order above is preserved.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use thiserror::Error;
use tracing::debug;

use super::TokenClaims;
use super::jwks::{JwksClient, JwksError};

/// Token validation failures
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("token is required")]
    EmptyToken,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unexpected signing method: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("failed to resolve signing key: {0}")]
    Key(#[from] JwksError),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer { expected: String, actual: String },

    #[error("invalid audience: token is not intended for {expected}")]
    InvalidAudience { expected: String },

    #[error("token has no expiry")]
    MissingExpiry,

    #[error("token is expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,
}

/// Validates bearer tokens into claims
///
/// The resource server depends on this capability rather than on
/// [`JwtValidator`] directly, so tests can substitute a fake.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate `token` and return its claims
    async fn validate(&self, token: &str) -> Result<TokenClaims, ValidationError>;
}

/// RS256/384/512 JWT validator backed by a shared [`JwksClient`]
#[derive(Clone)]
pub struct JwtValidator {
    issuer: String,
    audience: String,
    keys: Arc<JwksClient>,
}

impl fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("jwks_url", &self.keys.url())
            .finish()
    }
}

impl JwtValidator {
    /// Empty `issuer` or `audience` disables the corresponding check.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, keys: Arc<JwksClient>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            keys,
        }
    }

    /// The key-set cache this validator reads from
    pub fn keys(&self) -> &Arc<JwksClient> {
        &self.keys
    }

    fn check_claims(&self, claims: &TokenClaims) -> Result<(), ValidationError> {
        if !self.issuer.is_empty() {
            let actual = claims.iss.as_deref().unwrap_or_default();
            if actual != self.issuer {
                return Err(ValidationError::InvalidIssuer {
                    expected: self.issuer.clone(),
                    actual: actual.to_string(),
                });
            }
        }

        if !self.audience.is_empty() && !claims.aud.contains(&self.audience) {
            return Err(ValidationError::InvalidAudience {
                expected: self.audience.clone(),
            });
        }

        let now = Utc::now().timestamp();
        match claims.exp {
            None => return Err(ValidationError::MissingExpiry),
            Some(exp) if exp <= now => return Err(ValidationError::Expired),
            Some(_) => {}
        }

        if let Some(nbf) = claims.nbf
            && nbf > now
        {
            return Err(ValidationError::NotYetValid);
        }

        Ok(())
    }
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512)
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, ValidationError> {
        if token.is_empty() {
            return Err(ValidationError::EmptyToken);
        }

        let header = decode_header(token).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if !is_rsa(header.alg) {
            return Err(ValidationError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header.kid.as_deref().ok_or(ValidationError::MissingKeyId)?;
        let key = self.keys.resolve(kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => ValidationError::InvalidSignature,
            _ => ValidationError::Malformed(e.to_string()),
        })?;

        self.check_claims(&data.claims)?;

        debug!(
            kid = %kid,
            sub = data.claims.sub.as_deref().unwrap_or_default(),
            "Bearer token validated"
        );
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::Audience;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    // Never contacted: every case here fails before the key lookup
    fn validator() -> JwtValidator {
        let keys = Arc::new(JwksClient::new("http://127.0.0.1:9/jwks").unwrap());
        JwtValidator::new("https://issuer.example.com", "api", keys)
    }

    fn claims(exp_offset: i64) -> TokenClaims {
        let now = Utc::now().timestamp();
        TokenClaims {
            sub: Some("user-1".to_string()),
            iss: Some("https://issuer.example.com".to_string()),
            aud: "api".into(),
            exp: Some(now + exp_offset),
            iat: Some(now),
            ..TokenClaims::default()
        }
    }

    #[tokio::test]
    async fn test_empty_token() {
        assert!(matches!(
            validator().validate("").await,
            Err(ValidationError::EmptyToken)
        ));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        assert!(matches!(
            validator().validate("not.a.jwt").await,
            Err(ValidationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_hmac_algorithm_rejected() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        let token = encode(&header, &claims(3600), &EncodingKey::from_secret(b"secret")).unwrap();

        assert!(matches!(
            validator().validate(&token).await,
            Err(ValidationError::UnsupportedAlgorithm(alg)) if alg == "HS256"
        ));
    }

    #[tokio::test]
    async fn test_alg_none_rejected() {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&claims(3600)).unwrap());
        let token = format!("{header}.{payload}.");

        assert!(validator().validate(&token).await.is_err());
    }

    #[test]
    fn test_claim_checks_in_order() {
        let v = validator();
        assert!(v.check_claims(&claims(3600)).is_ok());

        let mut c = claims(-3600);
        c.iss = Some("https://evil.example.com".to_string());
        assert!(matches!(
            v.check_claims(&c),
            Err(ValidationError::InvalidIssuer { .. })
        ));

        let mut c = claims(-3600);
        c.aud = Audience::new(vec!["other".to_string()]);
        assert!(matches!(
            v.check_claims(&c),
            Err(ValidationError::InvalidAudience { .. })
        ));

        assert!(matches!(
            v.check_claims(&claims(-3600)),
            Err(ValidationError::Expired)
        ));

        let mut c = claims(3600);
        c.exp = None;
        assert!(matches!(v.check_claims(&c), Err(ValidationError::MissingExpiry)));

        let mut c = claims(3600);
        c.nbf = Some(Utc::now().timestamp() + 600);
        assert!(matches!(v.check_claims(&c), Err(ValidationError::NotYetValid)));
    }

    #[test]
    fn test_multi_audience_accepted() {
        let mut c = claims(3600);
        c.aud = Audience::new(vec!["other".to_string(), "api".to_string()]);
        assert!(validator().check_claims(&c).is_ok());
    }

    #[test]
    fn test_unconfigured_checks_skipped() {
        let keys = Arc::new(JwksClient::new("http://127.0.0.1:9/jwks").unwrap());
        let v = JwtValidator::new("", "", keys);
        let mut c = claims(3600);
        c.iss = None;
        c.aud = Audience::default();
        assert!(v.check_claims(&c).is_ok());
    }
}
