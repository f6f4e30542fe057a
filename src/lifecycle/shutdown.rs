//! Shutdown coordination and the orchestrator stop sequence.
//!
//! ```text
//! stop_http:
//!     keypair reloader closed → scheduler stopped → listener drained
//!     → every service closed → stop audit
//! ```
//! Each step runs to completion; failures are logged and the sequence
//! moves on.

use std::time::Duration;

use tokio::sync::watch;
use tracing::instrument::WithSubscriber;

use crate::lifecycle::audit::{EVT_SERVICE_STOPPED, EVT_SOURCE_STATUS};
use crate::lifecycle::orchestrator::{Listener, Orchestrator, Phase};

/// Extra wait on top of the grace period before the accept loop is abandoned.
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Coordinator for stopping background lines.
///
/// Built on a watch channel so subscribers created after the trigger
/// still observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (lines still listening).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to each background line.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    pub async fn recv(&mut self) {
        // A dropped coordinator counts as shutdown.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl Orchestrator {
    /// Stop everything `start_http` started and close every service.
    ///
    /// Blocks until the sequence completes. Calling it again is a no-op.
    pub async fn stop_http(&self) {
        self.stop_sequence().with_subscriber(self.dispatch.clone()).await
    }

    async fn stop_sequence(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.phase == Phase::Stopped {
            tracing::debug!("Already stopped");
            return;
        }
        lifecycle.phase = Phase::Stopped;

        if let Some(reloader) = lifecycle.tls_loader.take() {
            reloader.close().await;
        }

        self.scheduler.stop().await;

        if let Some(listener) = lifecycle.listener.take() {
            self.drain(listener).await;
        }

        for service in self.registry.snapshot() {
            tracing::debug!(service = service.name(), "Closing service");
            if let Err(e) = service.close().await {
                tracing::error!(service = service.name(), error = %e, "Service close failed");
            }
        }

        let ctx = self.local_context();
        self.audit(
            EVT_SOURCE_STATUS,
            EVT_SERVICE_STOPPED,
            &ctx.identity().to_string(),
            ctx.correlation_id(),
            0,
            &format!("node={}, uptime={}", self.node_name(), format_uptime(self.uptime())),
        );
    }

    async fn drain(&self, listener: Listener) {
        let Listener { handle, mut task } = listener;
        let grace = Duration::from_secs(self.config.http.shutdown_grace_secs);
        handle.graceful_shutdown(Some(grace));

        match tokio::time::timeout(grace + DRAIN_SLACK, &mut task).await {
            Ok(Ok(())) => tracing::info!("Listener drained"),
            Ok(Err(e)) => tracing::error!(error = %e, "Listener line ended abnormally"),
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Listener drain timed out");
                task.abort();
            }
        }
    }
}

/// Whole-second uptime in `1h2m3s` form; leading zero units are dropped.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut signal = shutdown.subscribe();
        signal.recv().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropped_coordinator_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        drop(shutdown);
        signal.recv().await;
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_millis(900)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_uptime(Duration::from_secs(3605)), "1h0m5s");
    }
}
