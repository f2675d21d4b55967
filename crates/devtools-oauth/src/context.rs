//! Request-scoped access to validated claims
//!
//! The gate stores the claims of an accepted token in the request
//! extensions under a private key. Downstream code reads them through the
//! functions here or the [`Authenticated`] extractor.

use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use http::{Extensions, StatusCode};
use thiserror::Error;

use crate::error::{ErrorCode, OAuth2Error};
use crate::jwt::TokenClaims;

/// Private extension key; only this module can insert or read it
#[derive(Debug, Clone)]
struct ClaimsExtension(Arc<TokenClaims>);

/// Scope check failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// No claims attached to the request
    #[error("request is not authenticated")]
    Unauthenticated,
    /// Claims present but the scope is missing
    #[error("insufficient permissions: required scope '{0}' not granted")]
    Missing(String),
}

pub(crate) fn attach(extensions: &mut Extensions, claims: TokenClaims) {
    extensions.insert(ClaimsExtension(Arc::new(claims)));
}

/// Claims attached by the gate, if the request was authenticated
pub fn claims(extensions: &Extensions) -> Option<&TokenClaims> {
    extensions.get::<ClaimsExtension>().map(|ext| ext.0.as_ref())
}

/// Whether the attached claims grant `scope`
///
/// Unauthenticated requests have no scopes.
pub fn has_scope(extensions: &Extensions, scope: &str) -> bool {
    claims(extensions).is_some_and(|claims| claims.has_scope(scope))
}

/// Require `scope` on the attached claims
///
/// # Errors
///
/// [`ScopeError::Unauthenticated`] when no claims are attached,
/// [`ScopeError::Missing`] when the scope is not granted.
pub fn require_scope(extensions: &Extensions, scope: &str) -> Result<(), ScopeError> {
    let claims = claims(extensions).ok_or(ScopeError::Unauthenticated)?;
    if claims.has_scope(scope) {
        Ok(())
    } else {
        Err(ScopeError::Missing(scope.to_string()))
    }
}

/// Extractor for handlers behind the gate
///
/// ```rust,ignore
/// async fn whoami(Authenticated(claims): Authenticated) -> String {
///     claims.sub.clone().unwrap_or_default()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Arc<TokenClaims>);

impl Deref for Authenticated {
    type Target = TokenClaims;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection for [`Authenticated`] on a request the gate did not accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingClaims;

impl IntoResponse for MissingClaims {
    fn into_response(self) -> Response {
        OAuth2Error::new(ErrorCode::InvalidToken, "Authentication required")
            .into_response_with(StatusCode::UNAUTHORIZED, Some("Bearer"))
    }
}

impl<S: Sync> FromRequestParts<S> for Authenticated {
    type Rejection = MissingClaims;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClaimsExtension>()
            .map(|ext| Self(Arc::clone(&ext.0)))
            .ok_or(MissingClaims)
    }
}
