//! Structured logging.
//!
//! # Responsibilities
//! - Build a `tracing` dispatcher from a filter directive and output format
//! - Install it as the process default for the binary
//!
//! # Design Decisions
//! - Library code never installs a global subscriber; the orchestrator takes
//!   a `Dispatch`, so tests and embedders can route logs anywhere
//! - JSON format for production, text format for development

use std::str::FromStr;

use tracing::Dispatch;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while setting up logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Unknown log format '{0}'")]
    Format(String),

    #[error("Logger already installed: {0}")]
    Install(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::Format(other.to_string())),
        }
    }
}

/// Build a dispatcher writing to stdout.
pub fn build_dispatch(filter: &str, format: LogFormat) -> Result<Dispatch, LoggingError> {
    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(filter)?);
    let dispatch = match format {
        LogFormat::Text => Dispatch::new(registry.with(fmt::layer())),
        LogFormat::Json => Dispatch::new(registry.with(fmt::layer().json())),
    };
    Ok(dispatch)
}

/// Build a dispatcher and install it as the global default.
pub fn init_logging(filter: &str, format: LogFormat) -> Result<Dispatch, LoggingError> {
    let dispatch = build_dispatch(filter, format)?;
    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(dispatch)
}
