//! Readiness gate.
//!
//! Answers the reserved availability path from the aggregated readiness
//! verdict; every other request passes straight through.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::health::ReadinessAggregator;

/// Reserved path answered by the gate.
pub const AVAILABILITY_PATH: &str = "/availability";

pub async fn readiness_gate(
    State(readiness): State<Arc<ReadinessAggregator>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.uri().path() != AVAILABILITY_PATH {
        return next.run(req).await;
    }

    if readiness.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        let pending = readiness.pending();
        tracing::debug!(?pending, "Not ready");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "pending": pending })),
        )
            .into_response()
    }
}
