//! The orchestrator: identity, collaborators and registered services.
//!
//! Lifecycle is one-shot:
//! ```text
//! New --start_http--> Started --stop_http--> Stopped
//! ```
//! A failed `start_http` leaves the instance in `New`. A stopped instance
//! is never restarted; build a new one.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::Dispatch;

use crate::cluster::{ClusterInfo, ClusterMember};
use crate::config::HostConfig;
use crate::error::{ClusterError, FatalError};
use crate::health::ReadinessAggregator;
use crate::http::context::{Identity, IdentityMapper, RequestContext};
use crate::lifecycle::audit::{AuditEvent, Auditor};
use crate::net::listener;
use crate::net::reloader::KeypairReloader;
use crate::observability::metrics::{Metrics, PrometheusPublisher};
use crate::security::authz::Authz;
use crate::service::{Service, ServiceRegistry};
use crate::tasks::Scheduler;

/// Receives unrecoverable runtime errors. The embedder decides whether the
/// process exits.
pub type FatalHandler = Arc<dyn Fn(FatalError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    New,
    Started,
    Stopped,
}

/// The running accept loop.
pub(crate) struct Listener {
    pub(crate) handle: axum_server::Handle,
    pub(crate) task: JoinHandle<()>,
}

/// Resources owned between start and stop.
pub(crate) struct Lifecycle {
    pub(crate) phase: Phase,
    pub(crate) tls_loader: Option<Arc<KeypairReloader>>,
    pub(crate) listener: Option<Listener>,
}

/// Hosts a set of services behind one listener and drives their
/// combined lifecycle.
pub struct Orchestrator {
    pub(crate) config: HostConfig,
    role_name: String,
    version: String,
    host_name: String,
    port: String,
    local_ip: IpAddr,
    started_at: DateTime<Utc>,
    pub(crate) start_instant: Instant,
    context: RequestContext,
    pub(crate) registry: Arc<ServiceRegistry>,
    pub(crate) scheduler: Scheduler,
    auditor: Option<Arc<dyn Auditor>>,
    pub(crate) authz: Option<Arc<dyn Authz>>,
    cluster: Option<Arc<dyn ClusterInfo>>,
    pub(crate) metrics: Arc<dyn Metrics>,
    pub(crate) identity_mapper: IdentityMapper,
    pub(crate) on_fatal: Option<FatalHandler>,
    pub(crate) dispatch: Dispatch,
    pub(crate) client_auth: OnceLock<bool>,
    pub(crate) local_addr: OnceLock<SocketAddr>,
    pub(crate) lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl Orchestrator {
    pub fn builder(config: HostConfig, role_name: impl Into<String>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            role_name: role_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            auditor: None,
            authz: None,
            cluster: None,
            metrics: None,
            identity_mapper: None,
            on_fatal: None,
            dispatch: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Configured service name.
    pub fn name(&self) -> &str {
        &self.config.http.service_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Address of the outbound interface, or loopback when undeterminable.
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.start_instant.elapsed()
    }

    /// Process-level context used for lifecycle audit events.
    pub fn local_context(&self) -> &RequestContext {
        &self.context
    }

    /// Address the listener actually bound, once it is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Whether clients must present a certificate. Fixed at startup.
    pub fn client_auth_enabled(&self) -> bool {
        self.client_auth.get().copied().unwrap_or(false)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Register a service. A later service with the same name replaces the
    /// earlier one. Services added after `start_http` are not dispatched to.
    pub fn add_service(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        let replaced = self.registry.add(service).is_some();
        tracing::dispatcher::with_default(&self.dispatch, || {
            if replaced {
                tracing::debug!(service = %name, "Service replaced");
            }
            if self.local_addr.get().is_some() {
                tracing::warn!(service = %name, "Service added after start; it will not receive requests");
            }
        });
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.get(name)
    }

    /// True iff every registered service is ready.
    pub fn is_ready(&self) -> bool {
        ReadinessAggregator::new(Arc::clone(&self.registry)).is_ready()
    }

    /// Node name in the cluster, or the host name without a cluster.
    pub fn node_name(&self) -> String {
        match &self.cluster {
            Some(cluster) => cluster.node_name(),
            None => self.host_name.clone(),
        }
    }

    pub fn node_id(&self) -> String {
        self.cluster.as_ref().map(|c| c.node_id()).unwrap_or_default()
    }

    pub fn leader_id(&self) -> String {
        self.cluster.as_ref().map(|c| c.leader_id()).unwrap_or_default()
    }

    pub fn cluster_members(&self) -> Result<Vec<ClusterMember>, ClusterError> {
        match &self.cluster {
            Some(cluster) => cluster.cluster_members(),
            None => Err(ClusterError::NotSupported),
        }
    }

    /// Emit an audit event to the auditor, or to the log without one.
    pub fn audit(
        &self,
        source: &str,
        event_type: &str,
        identity: &str,
        context_id: &str,
        sequence_index: u64,
        message: &str,
    ) {
        let event = AuditEvent {
            source: source.to_string(),
            event_type: event_type.to_string(),
            identity: identity.to_string(),
            context_id: context_id.to_string(),
            sequence_index,
            message: message.to_string(),
        };
        match &self.auditor {
            Some(auditor) => auditor.audit(event),
            None => tracing::dispatcher::with_default(&self.dispatch, || {
                tracing::info!("{event}");
            }),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name())
            .field("role_name", &self.role_name)
            .field("bind_addr", &self.config.http.bind_addr)
            .field("services", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Collects the orchestrator's collaborators.
pub struct OrchestratorBuilder {
    config: HostConfig,
    role_name: String,
    version: String,
    auditor: Option<Arc<dyn Auditor>>,
    authz: Option<Arc<dyn Authz>>,
    cluster: Option<Arc<dyn ClusterInfo>>,
    metrics: Option<Arc<dyn Metrics>>,
    identity_mapper: Option<IdentityMapper>,
    on_fatal: Option<FatalHandler>,
    dispatch: Option<Dispatch>,
}

impl OrchestratorBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub fn authz(mut self, authz: Arc<dyn Authz>) -> Self {
        self.authz = Some(authz);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterInfo>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Defaults to [`PrometheusPublisher`].
    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Defaults to [`Identity::from_certificate`].
    pub fn identity_mapper(mut self, mapper: IdentityMapper) -> Self {
        self.identity_mapper = Some(mapper);
        self
    }

    pub fn on_fatal(mut self, handler: impl Fn(FatalError) + Send + Sync + 'static) -> Self {
        self.on_fatal = Some(Arc::new(handler));
        self
    }

    /// Logger for everything the orchestrator and its lines emit.
    /// Defaults to the dispatcher current when `build` is called.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Arc<Orchestrator> {
        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        tracing::dispatcher::with_default(&dispatch.clone(), move || {
            let bind_addr = &self.config.http.bind_addr;
            let host_name = listener::host_name(bind_addr);
            let port = listener::port(bind_addr);
            let local_ip = listener::local_ip().unwrap_or_else(|e| {
                let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
                tracing::error!(error = %e, fallback = %fallback, "Unable to determine local IP");
                fallback
            });
            let context = RequestContext::for_role(&self.role_name, &host_name);

            tracing::info!(
                service = %self.config.http.service_name,
                role = %self.role_name,
                host = %host_name,
                port = %port,
                "Orchestrator created"
            );

            Arc::new(Orchestrator {
                role_name: self.role_name,
                version: self.version,
                host_name,
                port,
                local_ip,
                started_at: Utc::now(),
                start_instant: Instant::now(),
                context,
                registry: Arc::new(ServiceRegistry::new()),
                scheduler: Scheduler::with_dispatch(dispatch.clone()),
                auditor: self.auditor,
                authz: self.authz,
                cluster: self.cluster,
                metrics: self
                    .metrics
                    .unwrap_or_else(|| Arc::new(PrometheusPublisher)),
                identity_mapper: self
                    .identity_mapper
                    .unwrap_or_else(|| Arc::new(Identity::from_certificate)),
                on_fatal: self.on_fatal,
                dispatch,
                client_auth: OnceLock::new(),
                local_addr: OnceLock::new(),
                lifecycle: tokio::sync::Mutex::new(Lifecycle {
                    phase: Phase::New,
                    tls_loader: None,
                    listener: None,
                }),
                config: self.config,
            })
        })
    }
}
