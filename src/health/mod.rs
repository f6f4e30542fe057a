//! Readiness subsystem.
//!
//! # Data Flow
//! ```text
//! Readiness probe (GET /availability)
//!     → readiness.rs polls every registered service
//!     → AND of all verdicts (empty registry = ready)
//!     → 200 ready / 503 not ready
//! ```
//!
//! # Design Decisions
//! - Recomputed on every call; no cached verdict to go stale
//! - Cost is O(services), acceptable at health-check frequency

pub mod readiness;

pub use readiness::ReadinessAggregator;
