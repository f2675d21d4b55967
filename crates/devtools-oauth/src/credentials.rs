//! Random credential material
//!
//! Client identifiers, client secrets, PKCE verifiers and `state` values are
//! all drawn from the operating system CSPRNG and encoded as unpadded base64url.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Shortest code verifier allowed by RFC 7636 §4.1
pub const MIN_VERIFIER_LEN: usize = 43;
/// Longest code verifier allowed by RFC 7636 §4.1
pub const MAX_VERIFIER_LEN: usize = 128;

const CLIENT_ID_BYTES: usize = 16;
const CLIENT_SECRET_BYTES: usize = 32;
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 32;

/// Credential generation failures
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The operating system random source failed
    #[error("random source unavailable: {0}")]
    RandomSource(String),

    /// A generated verifier fell outside the RFC 7636 bounds
    #[error("generated code verifier has invalid length {0}")]
    VerifierLength(usize),
}

fn random_token(len: usize) -> Result<String, CredentialError> {
    let mut bytes = vec![0u8; len];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| CredentialError::RandomSource(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a client identifier (16 random bytes, 22 characters)
///
/// # Errors
///
/// Returns [`CredentialError::RandomSource`] if the OS random source fails.
pub fn generate_client_id() -> Result<String, CredentialError> {
    random_token(CLIENT_ID_BYTES)
}

/// Generate a client secret (32 random bytes, 43 characters)
///
/// # Errors
///
/// Returns [`CredentialError::RandomSource`] if the OS random source fails.
pub fn generate_client_secret() -> Result<String, CredentialError> {
    random_token(CLIENT_SECRET_BYTES)
}

/// Generate a PKCE code verifier (32 random bytes, 43 characters)
///
/// # Errors
///
/// Returns [`CredentialError::RandomSource`] if the OS random source fails, or
/// [`CredentialError::VerifierLength`] if the encoded verifier is out of bounds.
pub fn generate_code_verifier() -> Result<String, CredentialError> {
    let verifier = random_token(VERIFIER_BYTES)?;
    if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&verifier.len()) {
        return Err(CredentialError::VerifierLength(verifier.len()));
    }
    Ok(verifier)
}

/// Generate an OAuth `state` parameter (32 random bytes)
///
/// # Errors
///
/// Returns [`CredentialError::RandomSource`] if the OS random source fails.
pub fn generate_state() -> Result<String, CredentialError> {
    random_token(STATE_BYTES)
}

/// Check a code verifier against RFC 7636 §4.1: 43-128 unreserved characters
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
