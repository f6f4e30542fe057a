//! Built-in status endpoints.
//!
//! - `GET /v1/status/server`  identity and uptime of this node
//! - `GET /v1/status/version` build version
//! - `GET /v1/status/nodes`   cluster members (501 without a cluster)

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ClusterError;
use crate::http::response::ApiError;
use crate::lifecycle::Orchestrator;
use crate::service::{Service, ServiceError};

pub const STATUS_SERVICE_NAME: &str = "status";

#[derive(Debug, Serialize)]
struct ServerStatus {
    name: String,
    version: String,
    role: String,
    host: String,
    node: String,
    port: String,
    local_ip: String,
    started_at: String,
    uptime_secs: u64,
}

/// Reports on the orchestrator hosting it. Always ready.
#[derive(Debug, Clone)]
pub struct StatusService {
    server: Weak<Orchestrator>,
}

impl StatusService {
    pub fn new(server: &Arc<Orchestrator>) -> Arc<Self> {
        Arc::new(Self {
            server: Arc::downgrade(server),
        })
    }
}

#[async_trait]
impl Service for StatusService {
    fn name(&self) -> &str {
        STATUS_SERVICE_NAME
    }

    fn register(&self, router: Router) -> Router {
        router.merge(
            Router::new()
                .route("/v1/status/server", get(server_status))
                .route("/v1/status/version", get(version))
                .route("/v1/status/nodes", get(nodes))
                .with_state(self.server.clone()),
        )
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn upgrade(server: &Weak<Orchestrator>) -> Result<Arc<Orchestrator>, ApiError> {
    server
        .upgrade()
        .ok_or_else(|| ApiError::unavailable("server is shutting down"))
}

async fn server_status(State(server): State<Weak<Orchestrator>>) -> Result<Json<ServerStatus>, ApiError> {
    let server = upgrade(&server)?;
    Ok(Json(ServerStatus {
        name: server.name().to_string(),
        version: server.version().to_string(),
        role: server.role_name().to_string(),
        host: server.host_name().to_string(),
        node: server.node_name(),
        port: server.port().to_string(),
        local_ip: server.local_ip().to_string(),
        started_at: server.started_at().to_rfc3339(),
        uptime_secs: server.uptime().as_secs(),
    }))
}

async fn version(State(server): State<Weak<Orchestrator>>) -> Result<Response, ApiError> {
    let server = upgrade(&server)?;
    Ok(Json(serde_json::json!({ "version": server.version() })).into_response())
}

async fn nodes(State(server): State<Weak<Orchestrator>>) -> Result<Response, ApiError> {
    let server = upgrade(&server)?;
    match server.cluster_members() {
        Ok(members) => Ok(Json(members).into_response()),
        Err(ClusterError::NotSupported) => Err(ApiError::not_supported("cluster not supported")),
        Err(e) => {
            tracing::warn!(error = %e, "Cluster query failed");
            Err(ApiError::unavailable(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn hub() -> Arc<Orchestrator> {
        let mut config = HostConfig::default();
        config.http.bind_addr = "127.0.0.1:7002".into();
        Orchestrator::builder(config, "hub").version("9.9.9").build()
    }

    async fn get_json(router: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn reports_server_identity() {
        let hub = hub();
        let router = StatusService::new(&hub).register(Router::new());

        let (status, body) = get_json(router.clone(), "/v1/status/server").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "9.9.9");
        assert_eq!(body["role"], "hub");
        assert_eq!(body["port"], "7002");

        let (_, body) = get_json(router, "/v1/status/version").await;
        assert_eq!(body["version"], "9.9.9");
    }

    #[tokio::test]
    async fn nodes_not_supported_without_cluster() {
        let hub = hub();
        let router = StatusService::new(&hub).register(Router::new());
        let (status, body) = get_json(router, "/v1/status/nodes").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["code"], "not_supported");
    }

    #[tokio::test]
    async fn dropped_server_is_unavailable() {
        let hub = hub();
        let router = StatusService::new(&hub).register(Router::new());
        drop(hub);
        let (status, _) = get_json(router, "/v1/status/version").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
