//! Pluggable services hosted behind the shared listener.
//!
//! # Data Flow
//! ```text
//! add_service(svc)
//!     → registry.rs (name-keyed, last writer wins)
//!     → pipeline build: svc.register(router) once per service
//!     → health::readiness polls svc.is_ready()
//!     → shutdown: svc.close() exactly once
//! ```
//!
//! # Design Decisions
//! - Services are trait objects so callers can plug anything in
//! - The registry lock is never held while calling into a service

use async_trait::async_trait;
use axum::Router;

pub mod registry;
pub mod status;

pub use registry::ServiceRegistry;
pub use status::StatusService;

/// Error reported by a service while closing.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("close failed: {0}")]
    Close(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A named unit contributing request handlers and a readiness signal.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique name within the registry.
    fn name(&self) -> &str;

    /// Contribute handlers to the dispatch router.
    ///
    /// Called once while the pipeline is built.
    fn register(&self, router: Router) -> Router;

    /// Whether the service can take traffic right now.
    fn is_ready(&self) -> bool;

    /// Release resources. Called once during shutdown.
    async fn close(&self) -> Result<(), ServiceError>;
}
