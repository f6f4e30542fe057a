//! Error types surfaced by the orchestrator.
//!
//! # Taxonomy
//! - [`OrchestratorError`]: configuration problems returned synchronously
//!   from `start_http`. The caller decides whether the process continues.
//! - [`FatalError`]: runtime conditions that leave the process serving
//!   nothing. Delivered to the fatal callback, never raised as a panic.
//! - [`ClusterError`]: capability absence for cluster queries.

use std::net::SocketAddr;

use crate::config::validation::ValidationError;
use crate::net::tls::TlsError;
use crate::security::authz::AuthzError;

/// Errors returned by orchestrator lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("Unable to resolve bind address '{addr}': {source}")]
    BindAddress {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] TlsError),

    #[error("Authorization handler could not be built: {0}")]
    Authz(#[from] AuthzError),

    #[error("Profiler directory '{dir}' unavailable: {source}")]
    Profiler {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener on {addr} did not come up and no fatal handler is installed")]
    NotListening { addr: SocketAddr },

    #[error("Orchestrator already started; create a new instance instead")]
    AlreadyStarted,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unrecoverable runtime failures reported through the fatal callback.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("Address {addr} is already in use: {source}")]
    AddrInUse {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from cluster queries.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("cluster not supported")]
    NotSupported,

    #[error("cluster query failed: {0}")]
    Query(String),
}
