//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, sample rates in range)
//! - Check TLS settings are coherent (client auth needs a trusted CA)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::HostConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let bind = config.http.bind_addr.trim();
    if bind.is_empty() {
        errors.push(ValidationError::new("http.bind_addr", "must not be empty"));
    } else if !has_port(bind) {
        errors.push(ValidationError::new(
            "http.bind_addr",
            format!("'{bind}' is not in host:port form"),
        ));
    }

    if config.http.allow_profiling {
        if config.http.profiler_dir.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new(
                "http.profiler_dir",
                "required when allow_profiling is set",
            ));
        }
        let rate = config.http.profiler_sample_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            errors.push(ValidationError::new(
                "http.profiler_sample_rate",
                format!("{rate} is outside (0, 1]"),
            ));
        }
    }

    if let Some(tls) = &config.tls {
        if tls.cert_file.is_empty() {
            errors.push(ValidationError::new("tls.cert_file", "must not be empty"));
        }
        if tls.key_file.is_empty() {
            errors.push(ValidationError::new("tls.key_file", "must not be empty"));
        }
        if tls.client_auth_required() && tls.trusted_ca_file.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new(
                "tls.trusted_ca_file",
                "required when client_cert_auth is enabled",
            ));
        }
        if tls.reload_interval_secs == 0 {
            errors.push(ValidationError::new("tls.reload_interval_secs", "must be > 0"));
        }
        if tls.expiry_check_secs == 0 {
            errors.push(ValidationError::new("tls.expiry_check_secs", "must be > 0"));
        }
    }

    for entry in &config.authz.allow {
        if !entry.starts_with('/') || !entry.contains(':') {
            errors.push(ValidationError::new(
                "authz.allow",
                format!("'{entry}' is not in /path:role,... form"),
            ));
        }
    }

    match config.observability.log_format.as_str() {
        "text" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{other}' is not one of text, json"),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accepts "host:port", ":port" and "[v6]:port".
fn has_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((_, port)) => port.parse::<u16>().is_ok(),
        None => false,
    }
}
