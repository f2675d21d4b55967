//! Tower layers for the gate and the scope gate

use std::sync::Arc;

use tower::Layer;

use crate::server::ResourceServer;

use super::service::{GateService, RequireScopeService};

/// Wraps services with [`GateService`]
///
/// Build with [`ResourceServer::gate`].
#[derive(Debug, Clone)]
pub struct GateLayer {
    server: ResourceServer,
}

impl GateLayer {
    pub fn new(server: ResourceServer) -> Self {
        Self { server }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService::new(inner, self.server.clone())
    }
}

/// Wraps services with [`RequireScopeService`]
///
/// Build with [`ResourceServer::require_scope`].
#[derive(Debug, Clone)]
pub struct RequireScopeLayer {
    server: ResourceServer,
    scope: Arc<str>,
}

impl RequireScopeLayer {
    pub fn new(server: ResourceServer, scope: impl Into<String>) -> Self {
        Self {
            server,
            scope: Arc::from(scope.into()),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl<S> Layer<S> for RequireScopeLayer {
    type Service = RequireScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireScopeService::new(inner, self.server.clone(), Arc::clone(&self.scope))
    }
}
