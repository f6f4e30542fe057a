//! Startup sequence.
//!
//! ```text
//! validate config → resolve bind address → profiler
//!     → TLS context + keypair reloader → pipeline → accept loop
//!     → scheduled tasks → start audit
//! ```
//! Everything that can fail runs before the listener is launched, so a
//! configuration error leaves nothing running. A listener that never comes
//! up is an error only when no fatal handler is installed to hear about it.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::ServerConfig;
use tracing::instrument::WithSubscriber;

use crate::config::validation::validate_config;
use crate::config::TlsInfoConfig;
use crate::error::{FatalError, OrchestratorError};
use crate::http::metrics::RequestProfiler;
use crate::http::PipelineBuilder;
use crate::lifecycle::audit::{EVT_SERVICE_STARTED, EVT_SOURCE_STATUS};
use crate::lifecycle::orchestrator::{FatalHandler, Listener, Orchestrator, Phase};
use crate::net::acceptor::ClientCertAcceptor;
use crate::net::listener;
use crate::net::reloader::KeypairReloader;
use crate::net::tls::{build_server_config, CertificateInfo};
use crate::observability::metrics::Metrics;
use crate::tasks::Task;

/// TLS material ready to serve.
struct PreparedTls {
    config: ServerConfig,
    reloader: Arc<KeypairReloader>,
    client_auth: bool,
    expiry_check: Duration,
}

impl Orchestrator {
    /// Bind the listener, build the pipeline from the services registered
    /// so far and start background tasks.
    ///
    /// Returns once the accept loop is running. An address already in use
    /// is reported through the fatal callback rather than returned.
    pub async fn start_http(&self) -> Result<(), OrchestratorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.phase != Phase::New {
            return Err(OrchestratorError::AlreadyStarted);
        }

        let (tls_loader, listener) = self.launch().with_subscriber(self.dispatch.clone()).await?;
        lifecycle.tls_loader = tls_loader;
        lifecycle.listener = Some(listener);
        lifecycle.phase = Phase::Started;
        Ok(())
    }

    async fn launch(&self) -> Result<(Option<Arc<KeypairReloader>>, Listener), OrchestratorError> {
        validate_config(&self.config).map_err(OrchestratorError::Config)?;

        let bind_addr = self.config.http.bind_addr.as_str();
        let addr = listener::resolve_bind_addr(bind_addr)
            .await
            .map_err(|source| OrchestratorError::BindAddress {
                addr: bind_addr.to_string(),
                source,
            })?;

        let profiler = self.create_profiler()?;

        let tls = match self.config.tls.as_ref().filter(|t| !t.key_file.is_empty()) {
            Some(tls) => Some(self.prepare_tls(tls).await?),
            None => None,
        };
        let client_auth = tls.as_ref().is_some_and(|t| t.client_auth);

        let pipeline = PipelineBuilder::new(Arc::clone(&self.registry), self.role_name())
            .authz(self.authz.clone(), client_auth)
            .identity_mapper(Arc::clone(&self.identity_mapper))
            .profiler(profiler)
            .body_limit(self.config.http.max_request_size)
            .dispatch(self.dispatch.clone())
            .build();
        let router = match pipeline {
            Ok(router) => router,
            Err(e) => {
                if let Some(tls) = &tls {
                    tls.reloader.close().await;
                }
                return Err(e.into());
            }
        };

        let handle = Handle::new();
        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        let on_fatal = self.on_fatal.clone();
        let (task, prepared) = match tls {
            Some(tls) => {
                let acceptor = ClientCertAcceptor::new(RustlsConfig::from_config(Arc::new(tls.config)));
                let serve = axum_server::bind(addr)
                    .acceptor(acceptor)
                    .handle(handle.clone())
                    .serve(app);
                let task = tokio::spawn(
                    serve_line(serve, addr, "TLS", on_fatal).with_subscriber(self.dispatch.clone()),
                );
                (task, Some((tls.reloader, tls.expiry_check)))
            }
            None => {
                let serve = axum_server::bind(addr).handle(handle.clone()).serve(app);
                let task = tokio::spawn(
                    serve_line(serve, addr, "HTTP", on_fatal).with_subscriber(self.dispatch.clone()),
                );
                (task, None)
            }
        };

        match handle.listening().await {
            Some(bound) => {
                let _ = self.local_addr.set(bound);
            }
            None if self.on_fatal.is_none() => {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Listener line ended abnormally");
                }
                if let Some((reloader, _)) = &prepared {
                    reloader.close().await;
                }
                return Err(OrchestratorError::NotListening { addr });
            }
            None => tracing::warn!(address = %addr, "Listener did not come up"),
        }

        // Nothing below fails.
        let _ = self.client_auth.set(client_auth);

        let tls_loader = prepared.as_ref().map(|(reloader, _)| Arc::clone(reloader));
        if let Some((reloader, expiry_check)) = prepared {
            publish_cert_expiration(&reloader, self.metrics.as_ref());
            let metrics = Arc::clone(&self.metrics);
            let added = self.scheduler.add(Task::new("servertls", expiry_check, move || {
                let reloader = Arc::clone(&reloader);
                let metrics = Arc::clone(&metrics);
                async move { publish_cert_expiration(&reloader, metrics.as_ref()) }
            }));
            if let Err(e) = added {
                tracing::error!(error = %e, "Certificate expiry task not scheduled");
            }
        }

        let heartbeat = self.config.http.heartbeat_secs;
        if heartbeat > 0 {
            let metrics = Arc::clone(&self.metrics);
            let service = self.name().to_string();
            let started = self.start_instant;
            let added = self.scheduler.add(Task::new("server", Duration::from_secs(heartbeat), move || {
                let metrics = Arc::clone(&metrics);
                let service = service.clone();
                async move { metrics.publish_heartbeat(&service, started.elapsed()) }
            }));
            if let Err(e) = added {
                tracing::error!(error = %e, "Heartbeat task not scheduled");
            }
        }

        self.scheduler.start();

        let ctx = self.local_context();
        self.audit(
            EVT_SOURCE_STATUS,
            EVT_SERVICE_STARTED,
            &ctx.identity().to_string(),
            ctx.correlation_id(),
            0,
            &format!(
                "node='{}', address='{}', ClientAuth={}",
                self.node_name(),
                bind_addr.strip_prefix(':').unwrap_or(bind_addr),
                client_auth
            ),
        );

        Ok((tls_loader, Listener { handle, task }))
    }

    fn create_profiler(&self) -> Result<Option<Arc<RequestProfiler>>, OrchestratorError> {
        let http = &self.config.http;
        if !http.allow_profiling {
            return Ok(None);
        }
        let dir = http.profiler_dir.as_deref().unwrap_or_default();
        let profiler = RequestProfiler::create(Path::new(dir), http.profiler_sample_rate)?;
        Ok(Some(Arc::new(profiler)))
    }

    async fn prepare_tls(&self, tls: &TlsInfoConfig) -> Result<PreparedTls, OrchestratorError> {
        let client_auth = tls.client_auth_required();
        let reloader = KeypairReloader::with_dispatch(
            &tls.cert_file,
            &tls.key_file,
            Duration::from_secs(tls.reload_interval_secs),
            self.dispatch.clone(),
        )?;

        let trusted_ca = tls
            .trusted_ca_file
            .as_deref()
            .filter(|ca| !ca.is_empty())
            .map(Path::new);
        match build_server_config(trusted_ca, client_auth, reloader.clone()) {
            Ok(config) => {
                tracing::info!(
                    cert = %tls.cert_file,
                    key = %tls.key_file,
                    client_auth,
                    "TLS configured"
                );
                Ok(PreparedTls {
                    config,
                    reloader,
                    client_auth,
                    expiry_check: Duration::from_secs(tls.expiry_check_secs),
                })
            }
            Err(e) => {
                reloader.close().await;
                Err(e.into())
            }
        }
    }
}

/// Run the accept loop until it ends, escalating only address-in-use.
async fn serve_line<F>(serve: F, addr: SocketAddr, mode: &'static str, on_fatal: Option<FatalHandler>)
where
    F: Future<Output = io::Result<()>>,
{
    tracing::info!(address = %addr, mode, "Listener starting");
    match serve.await {
        Ok(()) => tracing::info!(address = %addr, mode, "Listener stopped"),
        Err(e) if listener::is_addr_in_use(&e) => {
            tracing::error!(address = %addr, mode, error = %e, "Address already in use");
            let fatal = FatalError::AddrInUse { addr, source: e };
            match on_fatal {
                Some(handler) => handler(fatal),
                None => tracing::error!(error = %fatal, "No fatal handler installed"),
            }
        }
        Err(e) => tracing::error!(address = %addr, mode, error = %e, "Listener ended"),
    }
}

/// Re-read the keypair and publish the serving certificate's remaining days.
fn publish_cert_expiration(reloader: &KeypairReloader, metrics: &dyn Metrics) {
    if let Err(e) = reloader.reload() {
        tracing::warn!(
            cert = %reloader.cert_path().display(),
            error = %e,
            "Keypair reload failed, keeping previous pair"
        );
    }

    let pair = reloader.keypair();
    let Some(leaf) = pair.cert.first() else {
        tracing::warn!(cert = %reloader.cert_path().display(), "Keypair has no certificate");
        return;
    };
    match CertificateInfo::from_der(leaf) {
        Ok(info) => metrics.publish_cert_expiration_in_days(&info, "server"),
        Err(e) => tracing::warn!(
            cert = %reloader.cert_path().display(),
            error = %e,
            "Unable to parse serving certificate"
        ),
    }
}
