//! In-process fan-out of sync changes to realtime subscribers.

use tokio::sync::broadcast;

use ledgerbox_core::sync::{SyncChange, SyncChangeNotifier};

const EVENT_BUS_CAPACITY: usize = 1024;

/// Best-effort, at-most-once: publishing never blocks and slow subscribers
/// lose the oldest changes.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncChange>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, change: SyncChange) {
        // No subscribers is not an error.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncChange> {
        self.sender.subscribe()
    }
}

impl SyncChangeNotifier for EventBus {
    fn publish(&self, change: SyncChange) {
        EventBus::publish(self, change);
    }
}
