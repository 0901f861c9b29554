//! Client-scoped event fan-out.
//!
//! Each `Client` owns one `EventBus`. Pool subscriptions forward connection
//! events into it and the transfer registry publishes lifecycle events.
//! Subscribers hold a `broadcast::Receiver`; dropping it unsubscribes.

use tokio::sync::broadcast;

use crate::transfer::{TransferDescriptor, TransferEvent, TransferProgress};

/// Default number of buffered events per subscriber before lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection `index` finished connecting.
    Connected { index: usize },
    /// Connection `index` closed (requested or dropped by the peer).
    Disconnected { index: usize },
    /// A running transfer moved bytes.
    Progress {
        transfer: TransferDescriptor,
        progress: TransferProgress,
    },
    /// A transfer was announced or settled.
    Transfer(TransferEvent),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publishes to current subscribers; a bus with no subscribers drops the event.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(ClientEvent::Connected { index: 2 });
        assert!(matches!(a.recv().await, Ok(ClientEvent::Connected { index: 2 })));
        assert!(matches!(b.recv().await, Ok(ClientEvent::Connected { index: 2 })));
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(ClientEvent::Disconnected { index: 0 });
        assert_eq!(bus.subscriber_count(), 0);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
