//! HTTP request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! TLS/TCP connection
//!     → context.rs (correlation id, caller identity)
//!     → logging.rs (one line per request, rejected ones included)
//!     → [security::authz] (only with client certificate auth)
//!     → metrics.rs (request counters, sampling profiler)
//!     → readiness.rs (answers /availability)
//!     → service routers, or response.rs not-found fallback
//! ```
//!
//! pipeline.rs fixes that order; nothing else composes layers.

pub mod context;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod readiness;
pub mod response;

pub use context::{Identity, RequestContext, RequestContextExt, X_CORRELATION_ID};
pub use pipeline::PipelineBuilder;
pub use readiness::AVAILABILITY_PATH;
pub use response::ApiError;
