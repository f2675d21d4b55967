//! PKCE (RFC 7636) challenge generation and verification
//!
//! Challenges are compared in constant time so a mismatching verifier leaks
//! nothing about how many leading characters were correct.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::credentials::{self, CredentialError};

/// How long a generated challenge may wait for its verifier
pub const CHALLENGE_MAX_AGE: TimeDelta = TimeDelta::minutes(10);

/// PKCE errors
#[derive(Debug, Error)]
pub enum PkceError {
    #[error("code challenge is required")]
    MissingChallenge,

    #[error("code verifier is required")]
    MissingVerifier,

    #[error("unsupported code challenge method: {0}")]
    UnsupportedMethod(String),

    #[error("code verifier must be 43-128 unreserved characters")]
    InvalidVerifier,

    #[error("code challenge does not match verifier")]
    Mismatch,

    #[error("PKCE challenge has expired")]
    Expired,

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Code challenge transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }

    /// Derive the challenge for `verifier`
    pub fn challenge_for(self, verifier: &str) -> String {
        match self {
            Self::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
            Self::Plain => verifier.to_string(),
        }
    }
}

impl fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PkceMethod {
    type Err = PkceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// A verifier together with its derived challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    #[serde(rename = "code_challenge_method")]
    pub method: PkceMethod,
    pub created_at: DateTime<Utc>,
}

impl PkceChallenge {
    /// Generate a fresh verifier and derive its challenge
    ///
    /// # Errors
    ///
    /// Returns [`PkceError::Credential`] if the random source fails.
    pub fn generate(method: PkceMethod) -> Result<Self, PkceError> {
        let code_verifier = credentials::generate_code_verifier()?;
        let code_challenge = method.challenge_for(&code_verifier);

        Ok(Self {
            code_verifier,
            code_challenge,
            method,
            created_at: Utc::now(),
        })
    }

    /// Whether the challenge is older than [`CHALLENGE_MAX_AGE`]
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.created_at > CHALLENGE_MAX_AGE
    }

    /// Check a verifier presented later in the flow against this challenge
    ///
    /// # Errors
    ///
    /// Returns [`PkceError::Expired`] for stale challenges, otherwise the
    /// errors of [`validate_challenge`].
    pub fn verify(&self, verifier: &str) -> Result<(), PkceError> {
        if self.is_expired() {
            return Err(PkceError::Expired);
        }
        validate_challenge(&self.code_challenge, self.method.as_str(), verifier)
    }
}

/// Generate a challenge for a method given by name (`S256` or `plain`)
///
/// # Errors
///
/// Returns [`PkceError::UnsupportedMethod`] for any other method name.
pub fn generate_challenge(method: &str) -> Result<PkceChallenge, PkceError> {
    PkceChallenge::generate(method.parse()?)
}

/// Verify `verifier` against `challenge` under `method`
///
/// # Errors
///
/// Fails when either value is empty, the method is unknown, the verifier is
/// not a valid RFC 7636 verifier, or the recomputed challenge differs.
pub fn validate_challenge(challenge: &str, method: &str, verifier: &str) -> Result<(), PkceError> {
    if challenge.is_empty() {
        return Err(PkceError::MissingChallenge);
    }
    if verifier.is_empty() {
        return Err(PkceError::MissingVerifier);
    }

    let method: PkceMethod = method.parse()?;
    if !credentials::is_valid_code_verifier(verifier) {
        return Err(PkceError::InvalidVerifier);
    }

    let expected = method.challenge_for(verifier);
    if bool::from(expected.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        tracing::debug!(method = %method, "PKCE verifier mismatch");
        Err(PkceError::Mismatch)
    }
}
