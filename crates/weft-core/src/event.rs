//! Broadcast event bus for distributing `EngineEvent` to subscribers.
//!
//! Built on `tokio::sync::broadcast`; publishing with no active
//! subscribers is a no-op, so instrumentation costs nothing when nobody
//! listens.

use tokio::sync::broadcast;
use weft_types::event::EngineEvent;

/// Multi-consumer bus for engine lifecycle events.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
pub struct EngineEventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EngineEventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Clone for EngineEventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EngineEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EngineEventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::InstanceStarted {
            workflow_id: Uuid::nil(),
        });

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EngineEvent::InstanceStarted { .. }));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EngineEventBus::new(16);
        bus.publish(EngineEvent::InstanceIdle {
            workflow_id: Uuid::nil(),
        });
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EngineEventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(EngineEvent::InstanceStarted {
            workflow_id: Uuid::nil(),
        });
        assert!(rx.try_recv().is_ok());
    }
}
