//! Request logging layer.
//!
//! Sits inside the context layer and outside authorization, so rejected
//! requests are logged with the identity that was refused.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::http::context::RequestContextExt;

/// State for [`request_logging_middleware`].
#[derive(Debug, Clone)]
pub struct RequestLogger {
    role: Arc<str>,
}

impl RequestLogger {
    /// `role` is the server role stamped on every line.
    pub fn new(role: &str) -> Self {
        Self { role: role.into() }
    }
}

pub async fn request_logging_middleware(
    State(logger): State<RequestLogger>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let (correlation_id, identity) = req
        .request_context()
        .map(|ctx| (ctx.correlation_id().to_string(), ctx.identity().to_string()))
        .unwrap_or_default();

    let response = next.run(req).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!(
            role = %logger.role,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            correlation_id = %correlation_id,
            identity = %identity,
            "Request failed"
        );
    } else {
        tracing::info!(
            role = %logger.role,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            correlation_id = %correlation_id,
            identity = %identity,
            "Request served"
        );
    }
    response
}
