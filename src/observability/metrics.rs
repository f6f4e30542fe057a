//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_uptime_seconds{service}` (gauge): published by the heartbeat task
//! - `tls_cert_expiry_days{role, subject}` (gauge): days left on the serving certificate
//! - `http_requests_total{method, status}` (counter): requests by outcome
//! - `http_request_duration_seconds{method}` (histogram): latency distribution
//!
//! # Design Decisions
//! - The orchestrator talks to a [`Metrics`] trait object, so tests can count
//!   publications without a global recorder
//! - The default publisher writes through the `metrics` facade; whichever
//!   recorder the binary installs receives the values

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::tls::CertificateInfo;

pub const SERVICE_UPTIME: &str = "service_uptime_seconds";
pub const TLS_CERT_EXPIRY_DAYS: &str = "tls_cert_expiry_days";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Sink for the orchestrator's own gauges.
pub trait Metrics: Send + Sync {
    /// Publish process uptime for `service`.
    fn publish_heartbeat(&self, service: &str, uptime: Duration);

    /// Publish the days left before `cert` expires.
    fn publish_cert_expiration_in_days(&self, cert: &CertificateInfo, role: &str);
}

/// [`Metrics`] backed by the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusPublisher;

impl Metrics for PrometheusPublisher {
    fn publish_heartbeat(&self, service: &str, uptime: Duration) {
        gauge!(SERVICE_UPTIME, "service" => service.to_string()).set(uptime.as_secs_f64());
    }

    fn publish_cert_expiration_in_days(&self, cert: &CertificateInfo, role: &str) {
        let days = cert.days_until_expiration(SystemTime::now());
        gauge!(
            TLS_CERT_EXPIRY_DAYS,
            "role" => role.to_string(),
            "subject" => cert.subject.clone()
        )
        .set(days as f64);
        if days < 30 {
            tracing::warn!(subject = %cert.subject, role, days, "Certificate expires soon");
        }
    }
}

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_gauge!(SERVICE_UPTIME, "Seconds since the service started");
    describe_gauge!(TLS_CERT_EXPIRY_DAYS, "Days until the serving certificate expires");
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests by method and status");
    describe_histogram!(HTTP_REQUEST_DURATION, "HTTP request duration in seconds");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one served request.
pub fn record_request(method: &str, status: u16, duration: Duration) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(HTTP_REQUEST_DURATION, "method" => method.to_string()).record(duration.as_secs_f64());
}
