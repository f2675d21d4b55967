//! # Tower middleware
//!
//! - [`GateLayer`] / [`GateService`] authenticate every request outside the
//!   discovery and registration paths and attach the validated claims to the
//!   request extensions.
//! - [`RequireScopeLayer`] / [`RequireScopeService`] answer 403
//!   `insufficient_scope` unless the attached claims grant a scope.
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//!
//! let app = Router::new()
//!     .route("/admin", get(admin).layer(server.require_scope("admin")))
//!     .route("/tools", get(tools))
//!     .merge(server.routes())
//!     .layer(server.gate());
//! ```
//!
//! Both services rebuild failure responses themselves and never return an
//! error of their own, so they compose with axum's infallible routers.

mod layer;
mod service;

pub use layer::{GateLayer, RequireScopeLayer};
pub use service::{GateFuture, GateService, RequireScopeService};
