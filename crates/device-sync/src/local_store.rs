//! Client-resident copy of synced records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use ledgerbox_core::sync::{EntityChange, SyncEntity, SyncOperation, SyncStatus};

use crate::error::{DeviceSyncError, Result};

/// A record as held on the device, with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    #[serde(rename = "entityType")]
    pub entity: SyncEntity,
    pub entity_id: String,
    /// Field map as last written locally or received from the server.
    pub data: Value,
    pub sync_status: SyncStatus,
    /// Operation to send on the next flush.
    pub operation: SyncOperation,
    /// Set by a local delete that the server has not confirmed yet.
    pub deleted: bool,
    pub updated_at: String,
    /// Local edit counter. A flush settles a record only if it still holds
    /// the revision that was sent.
    #[serde(default)]
    pub revision: u64,
    pub retry_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
}

impl LocalRecord {
    pub fn key(&self) -> (SyncEntity, String) {
        (self.entity, self.entity_id.clone())
    }

    /// Whether a pending record may be sent at `now` (RFC 3339).
    pub fn is_due(&self, now: &str) -> bool {
        self.sync_status == SyncStatus::Pending
            && self.next_retry_at.as_deref().map_or(true, |at| at <= now)
    }
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, entity: SyncEntity, entity_id: &str) -> Result<Option<LocalRecord>>;

    async fn put(&self, record: LocalRecord) -> Result<()>;

    async fn remove(&self, entity: SyncEntity, entity_id: &str) -> Result<()>;

    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<LocalRecord>>;

    /// Parks a remote change until the local record settles.
    async fn queue_remote(&self, change: EntityChange) -> Result<()>;

    /// Removes and returns the parked changes for one record, oldest first.
    async fn take_queued(&self, entity: SyncEntity, entity_id: &str)
        -> Result<Vec<EntityChange>>;

    async fn cursor(&self) -> Result<Option<String>>;

    async fn set_cursor(&self, cursor: Option<String>) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<(SyncEntity, String), LocalRecord>,
    queued: HashMap<(SyncEntity, String), Vec<EntityChange>>,
    cursor: Option<String>,
}

/// In-memory [`LocalStore`], used by tests and short-lived clients.
#[derive(Default)]
pub struct MemoryLocalStore {
    state: Mutex<MemoryState>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| DeviceSyncError::store("local store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, entity: SyncEntity, entity_id: &str) -> Result<Option<LocalRecord>> {
        self.with_state(|state| {
            state
                .records
                .get(&(entity, entity_id.to_string()))
                .cloned()
        })
    }

    async fn put(&self, record: LocalRecord) -> Result<()> {
        self.with_state(|state| {
            state.records.insert(record.key(), record);
        })
    }

    async fn remove(&self, entity: SyncEntity, entity_id: &str) -> Result<()> {
        self.with_state(|state| {
            state.records.remove(&(entity, entity_id.to_string()));
        })
    }

    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<LocalRecord>> {
        self.with_state(|state| {
            let mut records: Vec<LocalRecord> = state
                .records
                .values()
                .filter(|record| record.sync_status == status)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
            records
        })
    }

    async fn queue_remote(&self, change: EntityChange) -> Result<()> {
        self.with_state(|state| {
            state
                .queued
                .entry((change.entity, change.entity_id.clone()))
                .or_default()
                .push(change);
        })
    }

    async fn take_queued(
        &self,
        entity: SyncEntity,
        entity_id: &str,
    ) -> Result<Vec<EntityChange>> {
        self.with_state(|state| {
            state
                .queued
                .remove(&(entity, entity_id.to_string()))
                .unwrap_or_default()
        })
    }

    async fn cursor(&self) -> Result<Option<String>> {
        self.with_state(|state| state.cursor.clone())
    }

    async fn set_cursor(&self, cursor: Option<String>) -> Result<()> {
        self.with_state(|state| state.cursor = cursor)
    }
}
