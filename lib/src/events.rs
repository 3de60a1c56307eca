// lib/src/events.rs

use log::{debug, info};
use models::events::LedgerEvent;
use tokio::sync::broadcast;

/// Fire-and-forget sink for ledger notifications. Publishing never fails
/// and never blocks the operation that produced the event.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: LedgerEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: LedgerEvent) {}
}

/// Writes each event to the log under the `ledger_events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: LedgerEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "ledger_events", "{} {}", event.routing_key(), payload),
            Err(e) => info!(target: "ledger_events", "{} (unserializable: {})", event.routing_key(), e),
        }
    }
}

/// Fans events out to in-process subscribers. Slow subscribers lag and
/// lose events; with no subscribers events are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<LedgerEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastEventSink { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: LedgerEvent) {
        let key = event.routing_key();
        if self.sender.send(event).is_err() {
            debug!("No subscribers for {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::identifiers::{ConsentId, UserId};
    use models::medical::ConsentPermission;

    fn granted() -> LedgerEvent {
        LedgerEvent::ConsentGranted {
            consent_id: ConsentId::new(),
            patient_id: UserId::new(),
            doctor_id: UserId::new(),
            permission: ConsentPermission::View,
            granted_by: UserId::new(),
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut receiver = sink.subscribe();
        let event = granted();
        sink.publish(event.clone());
        assert_eq!(receiver.recv().await.unwrap(), event);
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        BroadcastEventSink::new(1).publish(granted());
        LogEventSink.publish(granted());
        NoopEventSink.publish(granted());
    }
}
