//! Audit bus: forwards every event to the configured sink and fans it out
//! to in-process subscribers over a tokio broadcast channel.
//!
//! Publishing never fails the caller. A sink error is logged and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::AuditEvent;
use crate::ports::SharedAuditSink;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

pub type SharedAuditBus = Arc<AuditBus>;

pub struct AuditBus {
    sender: broadcast::Sender<AuditEvent>,
    sink: SharedAuditSink,
    sink_failures: AtomicU64,
}

impl AuditBus {
    pub fn new(sink: SharedAuditSink) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            sink,
            sink_failures: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> SharedAuditBus {
        Arc::new(self)
    }

    /// Emit to the sink, then broadcast to subscribers.
    pub async fn publish(&self, event: AuditEvent) {
        let event_type = event.event_type.as_str();
        if let Err(e) = self.sink.emit(&event).await {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                event_type,
                incident = %event.incident_id,
                error = %e,
                "audit sink rejected event"
            );
        }

        // No receivers is fine; the sink already has it.
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "audit event published"),
            Err(_) => debug!(event_type, "audit event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    /// Events the sink has refused since startup.
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use uuid::Uuid;

    use crate::audit::AuditEventType;
    use crate::error::CollaboratorError;
    use crate::ports::AuditSink;

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn emit(&self, _event: &AuditEvent) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Transport("HEC unreachable".into()))
        }
    }

    fn event(event_type: AuditEventType, incident_id: Uuid) -> AuditEvent {
        AuditEvent::new(event_type, incident_id, "ap-1", "throughput", Utc::now())
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_broadcast() {
        let bus = AuditBus::new(Arc::new(BrokenSink));
        let mut rx = bus.subscribe();

        bus.publish(event(AuditEventType::Detection, Uuid::nil())).await;

        assert_eq!(rx.recv().await.unwrap().event_type, AuditEventType::Detection);
        assert_eq!(bus.sink_failures(), 1);
    }
}
