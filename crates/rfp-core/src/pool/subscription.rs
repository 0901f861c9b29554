//! Per-connection event subscription.
//!
//! The pool owns one `Subscription` per connection and hands the connection a
//! `ConnectionEvents` sender. Dropping the subscription detaches it: events a
//! stale connection emits after teardown go nowhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::connection::ConnectionStatus;
use crate::events::{ClientEvent, EventBus};
use crate::transfer::{TransferDescriptor, TransferProgress};

#[derive(Debug)]
struct Shared {
    index: usize,
    attached: AtomicBool,
    status: Mutex<ConnectionStatus>,
    bus: EventBus,
}

impl Shared {
    fn attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next`; emits Connected/Disconnected only on an actual change.
    fn transition(&self, next: ConnectionStatus) {
        if !self.attached() {
            return;
        }
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == next {
            return;
        }
        *status = next;
        match next {
            ConnectionStatus::Connected => self.bus.emit(ClientEvent::Connected { index: self.index }),
            ConnectionStatus::Disconnected => {
                self.bus.emit(ClientEvent::Disconnected { index: self.index })
            }
            ConnectionStatus::Connecting | ConnectionStatus::Busy => {}
        }
    }
}

/// Pool-side handle; detaches on drop.
#[derive(Debug)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    pub(crate) fn attach(index: usize, bus: EventBus) -> Self {
        Self {
            shared: Arc::new(Shared {
                index,
                attached: AtomicBool::new(true),
                status: Mutex::new(ConnectionStatus::Disconnected),
                bus,
            }),
        }
    }

    pub fn events(&self) -> ConnectionEvents {
        ConnectionEvents {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.shared.transition(status);
    }

    pub fn is_attached(&self) -> bool {
        self.shared.attached()
    }

    pub(crate) fn detach(&self) {
        self.shared.attached.store(false, Ordering::Release);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Connection-side sender for connect/disconnect/progress events.
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    shared: Arc<Shared>,
}

impl ConnectionEvents {
    /// Events not bound to any pool; everything emitted is dropped.
    pub fn detached(index: usize) -> Self {
        let subscription = Subscription::attach(index, EventBus::new(1));
        subscription.events()
    }

    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn connected(&self) {
        self.shared.transition(ConnectionStatus::Connected);
    }

    pub fn disconnected(&self) {
        self.shared.transition(ConnectionStatus::Disconnected);
    }

    pub fn progress(&self, transfer: &TransferDescriptor, progress: TransferProgress) {
        if !self.shared.attached() {
            return;
        }
        self.shared.bus.emit(ClientEvent::Progress {
            transfer: transfer.clone(),
            progress,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_changes_are_forwarded_once() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let subscription = Subscription::attach(1, bus);
        let events = subscription.events();

        events.connected();
        events.connected();
        assert_eq!(subscription.status(), ConnectionStatus::Connected);
        events.disconnected();

        assert!(matches!(rx.recv().await, Ok(ClientEvent::Connected { index: 1 })));
        assert!(matches!(rx.recv().await, Ok(ClientEvent::Disconnected { index: 1 })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscription_silences_the_connection() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let subscription = Subscription::attach(0, bus);
        let events = subscription.events();
        drop(subscription);

        events.connected();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detached_events_are_inert() {
        let events = ConnectionEvents::detached(4);
        events.connected();
        events.disconnected();
        assert_eq!(events.index(), 4);
    }
}
