//! Service host: pluggable network services behind one HTTP(S) listener,
//! with a coordinated lifecycle, hot-swapped TLS keypairs and aggregated
//! readiness.

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod service;
pub mod tasks;

pub use config::schema::HostConfig;
pub use error::{FatalError, OrchestratorError};
pub use lifecycle::Orchestrator;
pub use service::Service;
