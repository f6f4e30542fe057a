//! Audit events for lifecycle transitions.

use std::fmt;

use serde::Serialize;

/// Source of server status events.
pub const EVT_SOURCE_STATUS: &str = "status";
/// Emitted once the listener is launched.
pub const EVT_SERVICE_STARTED: &str = "service started";
/// Emitted once shutdown completes.
pub const EVT_SERVICE_STOPPED: &str = "service stopped";

/// An attributable record of a significant action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub source: String,
    pub event_type: String,
    /// Who triggered the event, as `role/name`.
    pub identity: String,
    pub context_id: String,
    /// Ordering index from the emitter (a log index), 0 when not applicable.
    pub sequence_index: u64,
    pub message: String,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audit:{}:{}:{}:{}:{}:{}",
            self.source,
            self.event_type,
            self.identity,
            self.context_id,
            self.sequence_index,
            self.message
        )
    }
}

/// Receives audit events. Emission is fire-and-forget.
pub trait Auditor: Send + Sync {
    fn audit(&self, event: AuditEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_form_orders_fields() {
        let event = AuditEvent {
            source: EVT_SOURCE_STATUS.into(),
            event_type: EVT_SERVICE_STOPPED.into(),
            identity: "hub/node1".into(),
            context_id: "c1".into(),
            sequence_index: 0,
            message: "node=node1, uptime=5s".into(),
        };
        assert_eq!(
            event.to_string(),
            "audit:status:service stopped:hub/node1:c1:0:node=node1, uptime=5s"
        );
    }
}
