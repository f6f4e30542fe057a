//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve address → TLS + reloader → pipeline → listener → tasks → audit
//!
//! Shutdown (shutdown.rs):
//!     Reloader closed → tasks stopped → listener drained → services closed → audit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls stop_http
//! ```
//!
//! # Design Decisions
//! - Ordered startup: every fallible step precedes the listener
//! - Ordered shutdown: nothing scheduled fires once services start closing
//! - Listener drain is capped at the grace period plus one second

pub mod audit;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use audit::{AuditEvent, Auditor};
pub use orchestrator::{FatalHandler, Orchestrator, OrchestratorBuilder};
pub use shutdown::{format_uptime, Shutdown, ShutdownSignal};
