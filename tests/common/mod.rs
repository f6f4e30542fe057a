//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;

use service_hub::config::TlsInfoConfig;
use service_hub::lifecycle::{AuditEvent, Auditor};
use service_hub::net::CertificateInfo;
use service_hub::observability::Metrics;
use service_hub::service::ServiceError;
use service_hub::{HostConfig, Service};

/// Config bound to a fixed loopback port, metrics off.
pub fn config(port: u16) -> HostConfig {
    let mut config = HostConfig::default();
    config.http.bind_addr = format!("127.0.0.1:{port}");
    config.http.service_name = "hub-test".into();
    config.http.shutdown_grace_secs = 1;
    config.observability.metrics_enabled = false;
    config
}

pub fn tls_config(cert: &Path, key: &Path) -> TlsInfoConfig {
    TlsInfoConfig {
        cert_file: cert.display().to_string(),
        key_file: key.display().to_string(),
        trusted_ca_file: None,
        client_cert_auth: None,
        reload_interval_secs: 1,
        expiry_check_secs: 3600,
    }
}

/// Write a self-signed pair into `dir`, overwriting any previous one.
/// Returns (cert path, key path, certificate DER).
pub fn write_self_signed(dir: &Path, name: &str) -> (PathBuf, PathBuf, Vec<u8>) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![name.to_string(), "localhost".to_string()])
            .unwrap();
    let cert_path = dir.join("server.pem");
    let key_path = dir.join("server.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    (cert_path, key_path, cert.der().to_vec())
}

/// A CA and one client certificate it issued.
pub struct ClientPki {
    /// PEM of the issuing CA, for `trusted_ca_file`.
    pub ca_path: PathBuf,
    /// Client key followed by its certificate, for `reqwest::Identity::from_pem`.
    pub identity_pem: Vec<u8>,
}

/// Issue a client certificate with the given CN and OU from a fresh CA,
/// writing the CA PEM into `dir`.
pub fn issue_client_cert(dir: &Path, common_name: &str, unit: &str) -> ClientPki {
    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
        IsCa, KeyPair,
    };

    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name = DistinguishedName::new();
    ca_params.distinguished_name.push(DnType::CommonName, "hub test ca");
    let ca_key = KeyPair::generate().unwrap();
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let mut params = CertificateParams::new(vec![format!("{common_name}.client.test")]).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.distinguished_name.push(DnType::OrganizationalUnitName, unit);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &ca_cert, &ca_key).unwrap();

    let ca_path = dir.join("client-ca.pem");
    std::fs::write(&ca_path, ca_cert.pem()).unwrap();
    let identity_pem = format!("{}{}", key.serialize_pem(), cert.pem()).into_bytes();
    ClientPki { ca_path, identity_pem }
}

/// In-memory log sink for an injected `tracing::Dispatch`.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    pub fn dispatch(&self) -> tracing::Dispatch {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Service with a toggleable readiness flag and one route, `/v1/<name>`.
pub struct ToggleService {
    name: String,
    pub ready: AtomicBool,
    pub hits: Arc<AtomicUsize>,
    pub closed: AtomicUsize,
}

impl ToggleService {
    pub fn new(name: &str, ready: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: AtomicBool::new(ready),
            hits: Arc::new(AtomicUsize::new(0)),
            closed: AtomicUsize::new(0),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for ToggleService {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, router: Router) -> Router {
        let hits = Arc::clone(&self.hits);
        let name = self.name.clone();
        router.route(
            &format!("/v1/{}", self.name),
            get(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                let name = name.clone();
                async move { name }
            }),
        )
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ServiceError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Service whose close always fails.
pub struct FailingClose;

#[async_trait]
impl Service for FailingClose {
    fn name(&self) -> &str {
        "failing"
    }

    fn register(&self, router: Router) -> Router {
        router
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), ServiceError> {
        Err(ServiceError::Close("disk on fire".into()))
    }
}

/// Counts publications instead of exporting them.
#[derive(Default)]
pub struct CountingMetrics {
    pub heartbeats: AtomicUsize,
    pub expiry_days: Mutex<Vec<i64>>,
}

impl CountingMetrics {
    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

impl Metrics for CountingMetrics {
    fn publish_heartbeat(&self, _service: &str, _uptime: Duration) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
    }

    fn publish_cert_expiration_in_days(&self, cert: &CertificateInfo, _role: &str) {
        let days = cert.days_until_expiration(std::time::SystemTime::now());
        self.expiry_days.lock().unwrap().push(days);
    }
}

/// Keeps every audit event.
#[derive(Default)]
pub struct RecordingAuditor {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditor {
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

impl Auditor for RecordingAuditor {
    fn audit(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
