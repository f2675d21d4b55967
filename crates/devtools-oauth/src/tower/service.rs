//! Tower services for the gate and the scope gate
//!
//! Both implement `Service<http::Request<B>>` for any body type and answer
//! failures with an OAuth JSON body instead of an error, so the inner
//! service's error type passes through unchanged.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::Response;
use futures_util::future::BoxFuture;
use http::StatusCode;
use tower::Service;
use tracing::debug;

use crate::context;
use crate::error::{ErrorCode, OAuth2Error};
use crate::server::ResourceServer;

/// Boxed future returned by both services
pub type GateFuture<E> = BoxFuture<'static, Result<Response, E>>;

/// Service that authenticates requests before forwarding them
///
/// Requests to the bypass paths are forwarded untouched. Everything else is
/// run through [`ResourceServer::authenticate_request`]; failures get a 401
/// with the challenge header, successes get their claims attached to the
/// request extensions.
#[derive(Debug, Clone)]
pub struct GateService<S> {
    inner: S,
    server: ResourceServer,
}

impl<S> GateService<S> {
    pub fn new(inner: S, server: ResourceServer) -> Self {
        Self { inner, server }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S, B> Service<http::Request<B>> for GateService<S>
where
    S: Service<http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = GateFuture<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.server.is_bypass_path(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let server = self.server.clone();
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let result = server.authenticate_request(&parts).await;

            match result.claims {
                Some(claims) if result.authenticated => {
                    context::attach(&mut parts.extensions, claims);
                    inner.call(http::Request::from_parts(parts, body)).await
                }
                _ => {
                    let error = result.error.unwrap_or_else(|| {
                        OAuth2Error::new(ErrorCode::InvalidToken, "The access token is invalid")
                    });
                    Ok(error.into_response_with(
                        StatusCode::UNAUTHORIZED,
                        result.www_authenticate.as_deref(),
                    ))
                }
            }
        })
    }
}

/// Service that requires a scope on the attached claims
#[derive(Debug, Clone)]
pub struct RequireScopeService<S> {
    inner: S,
    server: ResourceServer,
    scope: Arc<str>,
}

impl<S> RequireScopeService<S> {
    pub fn new(inner: S, server: ResourceServer, scope: Arc<str>) -> Self {
        Self {
            inner,
            server,
            scope,
        }
    }
}

impl<S, B> Service<http::Request<B>> for RequireScopeService<S>
where
    S: Service<http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = GateFuture<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        if context::has_scope(req.extensions(), &self.scope) {
            let clone = self.inner.clone();
            let mut inner = std::mem::replace(&mut self.inner, clone);
            return Box::pin(async move { inner.call(req).await });
        }

        debug!(scope = %self.scope, path = req.uri().path(), "Required scope not granted");
        let description = format!("Required scope: {}", self.scope);
        let challenge = self.server.scope_challenge(&description);
        let response = OAuth2Error::new(ErrorCode::InsufficientScope, description)
            .into_response_with(StatusCode::FORBIDDEN, Some(&challenge));

        Box::pin(async move { Ok(response) })
    }
}
