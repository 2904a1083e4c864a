//! Same-device cross-tab broadcast.
//!
//! Every tab (or window, or worker) holds a [`TabHandle`] on a shared
//! [`BroadcastHub`]. Delivery is at-most-once: a slow tab that falls behind
//! loses the oldest messages, and a tab never receives what it posted itself.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use ledgerbox_core::sync::{SyncEntity, SyncOperation};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BroadcastMessage {
    ReceiptCreated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ReceiptUpdated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ReceiptDeleted {
        id: String,
    },
    DeviceCreated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    DeviceUpdated {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    DeviceDeleted {
        id: String,
    },
    SyncCompleted {
        timestamp: String,
    },
    AuthChanged {
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
    SettingsChanged {
        settings: Value,
    },
}

impl BroadcastMessage {
    /// Message announcing a local write, for the kinds other tabs render live.
    pub fn for_local_change(
        entity: SyncEntity,
        operation: SyncOperation,
        id: &str,
        data: Option<Value>,
    ) -> Option<Self> {
        let id = id.to_string();
        let message = match (entity, operation) {
            (SyncEntity::Receipt, SyncOperation::Create) => Self::ReceiptCreated { id, data },
            (SyncEntity::Receipt, SyncOperation::Update) => Self::ReceiptUpdated { id, data },
            (SyncEntity::Receipt, SyncOperation::Delete) => Self::ReceiptDeleted { id },
            (SyncEntity::Device, SyncOperation::Create) => Self::DeviceCreated { id, data },
            (SyncEntity::Device, SyncOperation::Update) => Self::DeviceUpdated { id, data },
            (SyncEntity::Device, SyncOperation::Delete) => Self::DeviceDeleted { id },
            _ => return None,
        };
        Some(message)
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    message: BroadcastMessage,
}

/// Shared fan-out point for every tab on this device.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Envelope>,
    next_tab: Arc<AtomicU64>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_tab: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens a new tab endpoint.
    pub fn open_tab(&self) -> TabHandle {
        TabHandle {
            id: self.next_tab.fetch_add(1, Ordering::Relaxed),
            sender: self.sender.clone(),
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct TabHandle {
    id: u64,
    sender: broadcast::Sender<Envelope>,
    receiver: broadcast::Receiver<Envelope>,
}

impl TabHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Posts without waiting. Returns how many other tabs may see it.
    pub fn post(&self, message: BroadcastMessage) -> usize {
        let envelope = Envelope {
            origin: self.id,
            message,
        };
        match self.sender.send(envelope) {
            // The sender's own receiver counts as one.
            Ok(receivers) => receivers.saturating_sub(1),
            Err(_) => 0,
        }
    }

    /// Next message from another tab; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Tab {} dropped {} broadcast message(s)", self.id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) if envelope.origin == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
