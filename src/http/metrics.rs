//! Request metrics and sampling profiler.
//!
//! Both are passthroughs: the response is returned untouched.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::error::OrchestratorError;
use crate::http::context::RequestContextExt;
use crate::observability::metrics::record_request;

#[derive(Debug, Serialize)]
struct ProfileRecord<'a> {
    at: String,
    method: &'a str,
    path: &'a str,
    status: u16,
    duration_us: u64,
    correlation_id: &'a str,
}

#[derive(Debug)]
enum ProfileCommand {
    Record(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON line per sampled request to
/// `<dir>/requests-<pid>.jsonl`.
///
/// Records are queued to a writer task, so the request path never touches
/// the file.
#[derive(Debug)]
pub struct RequestProfiler {
    path: PathBuf,
    sample_rate: f64,
    tx: mpsc::UnboundedSender<ProfileCommand>,
}

impl RequestProfiler {
    /// Create the output directory, open the profile file and spawn its
    /// writer. Must be called within a Tokio runtime.
    pub fn create(dir: &Path, sample_rate: f64) -> Result<Self, OrchestratorError> {
        let err = |source| OrchestratorError::Profiler {
            dir: dir.display().to_string(),
            source,
        };
        fs::create_dir_all(dir).map_err(err)?;
        let path = dir.join(format!("requests-{}.jsonl", std::process::id()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        tokio::spawn(write_profiles(file, path.clone(), rx).with_subscriber(dispatch));

        tracing::info!(path = %path.display(), sample_rate, "Request profiler enabled");
        Ok(Self {
            path,
            sample_rate,
            tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every record queued so far is on disk.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(ProfileCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    fn should_sample(&self) -> bool {
        self.sample_rate >= 1.0 || fastrand::f64() < self.sample_rate
    }

    fn record(&self, method: &str, path: &str, status: u16, elapsed: Duration, correlation_id: &str) {
        let record = ProfileRecord {
            at: Utc::now().to_rfc3339(),
            method,
            path,
            status,
            duration_us: elapsed.as_micros() as u64,
            correlation_id,
        };
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Unable to encode profile record");
                return;
            }
        };
        line.push(b'\n');

        if self.tx.send(ProfileCommand::Record(line)).is_err() {
            tracing::warn!(path = %self.path.display(), "Profile writer gone, record dropped");
        }
    }
}

/// Drain queued records into the file, flushing whenever the queue empties.
async fn write_profiles(file: File, path: PathBuf, mut rx: mpsc::UnboundedReceiver<ProfileCommand>) {
    let mut out = BufWriter::new(tokio::fs::File::from_std(file));
    while let Some(command) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut next = Some(command);
        while let Some(command) = next {
            match command {
                ProfileCommand::Record(line) => {
                    if let Err(e) = out.write_all(&line).await {
                        tracing::warn!(path = %path.display(), error = %e, "Unable to write profile record");
                    }
                }
                ProfileCommand::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }
        if let Err(e) = out.flush().await {
            tracing::warn!(path = %path.display(), error = %e, "Unable to flush profile records");
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
    if let Err(e) = out.flush().await {
        tracing::warn!(path = %path.display(), error = %e, "Unable to flush profile records");
    }
    tracing::debug!(path = %path.display(), "Profile writer stopped");
}

/// State for [`request_metrics_middleware`].
#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    profiler: Option<Arc<RequestProfiler>>,
}

impl RequestMetrics {
    pub fn new(profiler: Option<Arc<RequestProfiler>>) -> Self {
        Self { profiler }
    }
}

pub async fn request_metrics_middleware(
    State(state): State<RequestMetrics>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let sampled = state
        .profiler
        .as_ref()
        .filter(|p| p.should_sample())
        .map(|p| {
            let correlation_id = req.correlation_id().unwrap_or_default().to_string();
            (Arc::clone(p), req.uri().path().to_string(), correlation_id)
        });

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    record_request(&method, status, elapsed);
    if let Some((profiler, path, correlation_id)) = sampled {
        profiler.record(&method, &path, status, elapsed, &correlation_id);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn profiler_appends_sampled_requests() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("profiles");
        let profiler = Arc::new(RequestProfiler::create(&out, 1.0).unwrap());
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(from_fn_with_state(
                RequestMetrics::new(Some(Arc::clone(&profiler))),
                request_metrics_middleware,
            ));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), 200);
        }

        profiler.flush().await;
        let contents = std::fs::read_to_string(profiler.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "/ping");
        assert_eq!(first["status"], 200);
    }

    #[tokio::test]
    async fn unusable_directory_is_config_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = RequestProfiler::create(&blocker.join("sub"), 0.5).unwrap_err();
        assert!(matches!(err, OrchestratorError::Profiler { .. }));
    }
}
