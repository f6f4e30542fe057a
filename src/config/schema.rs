//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Listener and pipeline settings.
    pub http: HttpServerConfig,

    /// Optional TLS material. Absent means plain HTTP.
    pub tls: Option<TlsInfoConfig>,

    /// Path-based authorization rules.
    pub authz: AuthzConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Service name reported in status, metrics and logs.
    pub service_name: String,

    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_addr: String,

    /// Uptime heartbeat interval in seconds. 0 disables the heartbeat.
    pub heartbeat_secs: u64,

    /// Enable the sampling request profiler.
    pub allow_profiling: bool,

    /// Directory receiving profiler output.
    pub profiler_dir: Option<String>,

    /// Fraction of requests sampled by the profiler, in (0, 1].
    pub profiler_sample_rate: f64,

    /// Grace period for in-flight requests when the listener is drained.
    pub shutdown_grace_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_request_size: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            service_name: "service-hub".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_secs: 0,
            allow_profiling: false,
            profiler_dir: None,
            profiler_sample_rate: 0.01,
            shutdown_grace_secs: 10,
            max_request_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsInfoConfig {
    /// Path to certificate chain file (PEM).
    pub cert_file: String,

    /// Path to private key file (PEM).
    pub key_file: String,

    /// Path to CA bundle used to verify client certificates (PEM).
    #[serde(default)]
    pub trusted_ca_file: Option<String>,

    /// Require clients to present a certificate signed by the trusted CA.
    #[serde(default)]
    pub client_cert_auth: Option<bool>,

    /// How often the keypair files are checked for changes.
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,

    /// How often certificate expiry is published.
    #[serde(default = "default_expiry_check")]
    pub expiry_check_secs: u64,
}

impl TlsInfoConfig {
    /// Whether client certificate authentication was requested.
    pub fn client_auth_required(&self) -> bool {
        self.client_cert_auth.unwrap_or(false)
    }
}

fn default_reload_interval() -> u64 {
    5
}

fn default_expiry_check() -> u64 {
    3600
}

/// Path-based authorization rules.
///
/// Entries in `allow` take the form `"/path:role1,role2"`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthzConfig {
    /// Paths and the roles permitted on them.
    pub allow: Vec<String>,

    /// Paths open to every caller.
    pub allow_any: Vec<String>,

    /// Paths open to every caller holding a client certificate.
    pub allow_any_role: Vec<String>,
}

impl AuthzConfig {
    /// True when no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.allow_any.is_empty() && self.allow_any_role.is_empty()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive).
    pub log_level: String,

    /// Log output format: "text" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
