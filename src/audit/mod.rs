//! Audit sink for security-relevant events.
//!
//! Recording is fire-and-forget: a sink failure is logged and swallowed,
//! never surfaced on the request's success or failure path.

use serde_json::Value;
use std::sync::Mutex;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// A single security-relevant event (login, logout, denial, ...).
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub action: &'static str,
    pub actor_id: Option<Uuid>,
    pub metadata: Value,
    pub recorded_at_unix: i64,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: &'static str) -> Self {
        Self {
            action,
            actor_id: None,
            metadata: Value::Null,
            recorded_at_unix: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Destination for audit events. Implementations must not block the caller;
/// anything slow belongs behind a channel or a spawned task.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: structured `tracing` events on the `audit` target, so the
/// subscriber decides where the trail ends up.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = event.action,
            actor_id = event.actor_id.map(|id| id.to_string()),
            metadata = %event.metadata,
            recorded_at_unix = event.recorded_at_unix,
            "audit event"
        );
    }
}

/// Collecting sink for tests: events are held in memory for assertions.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded actions, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(|event| event.action).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::new("login_success").with_actor(Uuid::new_v4()));
        sink.record(
            AuditEvent::new("permission_denied")
                .with_metadata(json!({"resource": "users", "action": "write"})),
        );

        assert_eq!(sink.actions(), vec!["login_success", "permission_denied"]);
        let events = sink.events();
        assert!(events[0].actor_id.is_some());
        assert_eq!(events[1].metadata["resource"], "users");
    }

    #[test]
    fn tracing_sink_never_panics() {
        TracingAuditSink.record(AuditEvent::new("logout"));
    }
}
