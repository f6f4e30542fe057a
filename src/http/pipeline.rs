//! Composition of the request pipeline.
//!
//! ```text
//! context → logging → [authz] → metrics → readiness gate → dispatch / 404
//! ```
//!
//! Authorization is only inserted when client certificates are required
//! and an [`Authz`] collaborator is configured.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tracing::Dispatch;

use crate::health::ReadinessAggregator;
use crate::http::context::{context_middleware, role_from_request, ContextLayer, Identity, IdentityMapper};
use crate::http::logging::{request_logging_middleware, RequestLogger};
use crate::http::metrics::{request_metrics_middleware, RequestMetrics, RequestProfiler};
use crate::http::readiness::readiness_gate;
use crate::http::response::not_found;
use crate::security::authz::{Authz, AuthzError};
use crate::service::ServiceRegistry;

/// Builds the composed handler from a registry snapshot.
pub struct PipelineBuilder {
    registry: Arc<ServiceRegistry>,
    role: String,
    authz: Option<Arc<dyn Authz>>,
    client_auth: bool,
    identity_mapper: IdentityMapper,
    profiler: Option<Arc<RequestProfiler>>,
    body_limit: Option<usize>,
    dispatch: Dispatch,
}

impl PipelineBuilder {
    pub fn new(registry: Arc<ServiceRegistry>, role: impl Into<String>) -> Self {
        Self {
            registry,
            role: role.into(),
            authz: None,
            client_auth: false,
            identity_mapper: Arc::new(Identity::from_certificate),
            profiler: None,
            body_limit: None,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Authorization collaborator, applied only when `client_auth` is set.
    pub fn authz(mut self, authz: Option<Arc<dyn Authz>>, client_auth: bool) -> Self {
        self.authz = authz;
        self.client_auth = client_auth;
        self
    }

    pub fn identity_mapper(mut self, mapper: IdentityMapper) -> Self {
        self.identity_mapper = mapper;
        self
    }

    pub fn profiler(mut self, profiler: Option<Arc<RequestProfiler>>) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = Some(bytes);
        self
    }

    /// Dispatcher every request future runs under.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn build(self) -> Result<Router, AuthzError> {
        let services = self.registry.snapshot();
        let mut router = Router::new();
        for service in &services {
            router = service.register(router);
        }
        tracing::debug!(service_count = services.len(), "Services registered");

        let mut router = router.fallback(not_found);
        if let Some(limit) = self.body_limit {
            router = router.layer(DefaultBodyLimit::max(limit));
        }

        let readiness = Arc::new(ReadinessAggregator::new(Arc::clone(&self.registry)));
        let router = router
            .layer(from_fn_with_state(readiness, readiness_gate))
            .layer(from_fn_with_state(
                RequestMetrics::new(self.profiler),
                request_metrics_middleware,
            ));

        tracing::info!(role = %self.role, client_auth = self.client_auth, "Building request pipeline");
        let router = match (&self.authz, self.client_auth) {
            (Some(authz), true) => {
                authz.set_role_mapper(Arc::new(role_from_request));
                authz.new_handler(router)?
            }
            _ => router,
        };

        Ok(router
            .layer(from_fn_with_state(
                RequestLogger::new(&self.role),
                request_logging_middleware,
            ))
            .layer(from_fn_with_state(
                ContextLayer::new(self.identity_mapper, self.dispatch),
                context_middleware,
            )))
    }
}
