//! Service Hub
//!
//! Hosts pluggable services behind a single HTTP(S) endpoint.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS──▶ net (acceptor, keypair reloader)
//!                       │
//!                       ▼
//!                     http pipeline
//!                     context → logging → authz → metrics → readiness
//!                       │
//!                       ▼
//!                     service routers (status, ...)
//!
//!     lifecycle::Orchestrator drives start/stop of all of the above,
//!     plus the task scheduler (heartbeat, certificate expiry).
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use service_hub::config::load_config;
use service_hub::lifecycle::signals::shutdown_signal;
use service_hub::observability::logging::{init_logging, LogFormat};
use service_hub::observability::metrics::init_metrics;
use service_hub::security::PathAuthz;
use service_hub::service::StatusService;
use service_hub::{FatalError, HostConfig, Orchestrator};

#[derive(Debug, Parser)]
#[command(name = "service-hub", version, about = "Hosts pluggable services behind one listener")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter; overrides RUST_LOG and the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Server role reported in logs and audit events.
    #[arg(long, default_value = "service-hub")]
    role: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("service-hub: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => HostConfig::default(),
    };

    let filter = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| config.observability.log_level.clone());
    let format = match config.observability.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("service-hub: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&filter, format) {
        eprintln!("service-hub: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), role = %cli.role, "service-hub starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<FatalError>();
    let mut builder = Orchestrator::builder(config.clone(), cli.role.clone()).on_fatal(move |e| {
        let _ = fatal_tx.send(e);
    });
    if !config.authz.is_empty() {
        match PathAuthz::new(&config.authz) {
            Ok(authz) => builder = builder.authz(Arc::new(authz)),
            Err(e) => {
                tracing::error!(error = %e, "Invalid authorization rules");
                return ExitCode::FAILURE;
            }
        }
    }
    let hub = builder.build();
    hub.add_service(StatusService::new(&hub));

    if let Err(e) = hub.start_http().await {
        tracing::error!(error = %e, "Failed to start");
        return ExitCode::FAILURE;
    }

    let code = tokio::select! {
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => tracing::info!(signal = name, "Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Unable to listen for signals"),
            }
            ExitCode::SUCCESS
        }
        Some(fatal) = fatal_rx.recv() => {
            tracing::error!(error = %fatal, "Fatal error, shutting down");
            ExitCode::FAILURE
        }
    };

    hub.stop_http().await;
    tracing::info!("Shutdown complete");
    code
}
