//! Client-side reconciliation: optimistic local writes, outbox flushing and
//! guarded application of remote changes.

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use ledgerbox_core::sync::{
    backoff_seconds, should_apply_lww, BatchResult, EntityChange, SyncChange, SyncEntity,
    SyncItem, SyncOperation, SyncStatus, SyncStatusEvent, CLIENT_FLUSH_BATCH_SIZE,
    CLIENT_FLUSH_INTERVAL_SECS, DEFAULT_CHANGE_FEED_LIMIT,
};
use ledgerbox_core::utils::time_utils::{format_timestamp, now_timestamp};

use crate::broadcast::{BroadcastMessage, TabHandle};
use crate::client::SyncTransport;
use crate::error::{ApiRetryClass, DeviceSyncError, Result};
use crate::local_store::{LocalRecord, LocalStore};

const MAX_PULL_PAGES: usize = 20;

/// Outcome of handing a remote change to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    Applied,
    /// Parked because the local record holds unsynced input.
    Queued,
    /// Older than the local copy.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub confirmed: usize,
    pub rejected: usize,
    /// Left pending for a later attempt.
    pub deferred: usize,
    pub reauth_required: bool,
}

pub struct SyncReconciler {
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn SyncTransport>,
    tab: Option<TabHandle>,
    batch_size: usize,
    flush_lock: Mutex<()>,
}

impl SyncReconciler {
    pub fn new(store: Arc<dyn LocalStore>, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            store,
            transport,
            tab: None,
            batch_size: CLIENT_FLUSH_BATCH_SIZE,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn with_tab(mut self, tab: TabHandle) -> Self {
        self.tab = Some(tab);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn post(&self, message: BroadcastMessage) {
        if let Some(tab) = &self.tab {
            tab.post(message);
        }
    }

    /// Writes a local change optimistically as `pending`.
    ///
    /// Update data is merged into the existing local copy so partial edits
    /// keep the fields they do not mention.
    pub async fn record_local_change(
        &self,
        entity: SyncEntity,
        entity_id: &str,
        operation: SyncOperation,
        data: Option<Value>,
    ) -> Result<LocalRecord> {
        if entity_id.trim().is_empty() {
            return Err(DeviceSyncError::invalid_request("entityId must not be empty"));
        }
        let incoming = match (operation, data) {
            (SyncOperation::Delete, _) => None,
            (_, Some(Value::Object(map))) => Some(map),
            (op, _) => {
                return Err(DeviceSyncError::invalid_request(format!(
                    "Data is required for {} operation",
                    op
                )))
            }
        };

        let existing = self.store.get(entity, entity_id).await?;
        let sync_status = match &existing {
            Some(record) => record.sync_status.transition(SyncStatusEvent::LocalEdit)?,
            None => SyncStatus::Pending,
        };

        // A never-confirmed create stays a create until the server has it.
        let pending_create = existing.as_ref().is_some_and(|record| {
            record.sync_status != SyncStatus::Synced && record.operation == SyncOperation::Create
        });
        let next_operation = match operation {
            SyncOperation::Delete => SyncOperation::Delete,
            _ if pending_create => SyncOperation::Create,
            _ if existing.is_none() => SyncOperation::Create,
            op => op,
        };

        let mut merged = match existing.as_ref().map(|r| &r.data) {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(fields) = incoming {
            merged.extend(fields);
        }

        let record = LocalRecord {
            entity,
            entity_id: entity_id.to_string(),
            data: Value::Object(merged),
            sync_status,
            operation: next_operation,
            deleted: operation.is_delete(),
            updated_at: now_timestamp(),
            revision: existing.as_ref().map_or(1, |record| record.revision + 1),
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        };
        self.store.put(record.clone()).await?;

        let payload = (!record.deleted).then(|| record.data.clone());
        if let Some(message) =
            BroadcastMessage::for_local_change(entity, next_operation, entity_id, payload)
        {
            self.post(message);
        }
        Ok(record)
    }

    /// Sends due pending records in chunks and settles their status.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _guard = self.flush_lock.lock().await;
        let now = now_timestamp();
        let due: Vec<LocalRecord> = self
            .store
            .list_by_status(SyncStatus::Pending)
            .await?
            .into_iter()
            .filter(|record| record.is_due(&now))
            .collect();

        let mut report = FlushReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        debug!("[DeviceSync] Flushing {} pending record(s)", due.len());

        let mut needs_pull = false;
        for chunk in due.chunks(self.batch_size) {
            let items: Vec<SyncItem> = chunk.iter().map(to_sync_item).collect();
            report.sent += items.len();

            match self.transport.push_batch(items).await {
                Ok(result) => {
                    needs_pull |= self.settle_chunk(chunk, &result, &mut report).await?;
                }
                Err(err) => match err.retry_class() {
                    ApiRetryClass::ReauthRequired => {
                        warn!("[DeviceSync] Auth error during push; records stay pending");
                        report.reauth_required = true;
                        report.deferred += chunk.len();
                        break;
                    }
                    ApiRetryClass::Retryable => {
                        warn!("[DeviceSync] Push failed, will retry: {}", err);
                        self.schedule_retry(chunk, &err.to_string()).await?;
                        report.deferred += chunk.len();
                        break;
                    }
                    ApiRetryClass::Permanent => {
                        warn!("[DeviceSync] Push rejected: {}", err);
                        for record in chunk {
                            self.reject(record, &err.to_string()).await?;
                        }
                        report.rejected += chunk.len();
                    }
                },
            }
        }

        if needs_pull {
            self.pull().await?;
        }
        self.post(BroadcastMessage::SyncCompleted {
            timestamp: now_timestamp(),
        });
        info!(
            "[DeviceSync] Flush done sent={} confirmed={} rejected={} deferred={}",
            report.sent, report.confirmed, report.rejected, report.deferred
        );
        Ok(report)
    }

    /// Flushes every `period` until the returned task is aborted. A failed
    /// round is logged and the next tick tries again.
    pub fn spawn_flush_loop(self: Arc<Self>, period: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = self.flush().await {
                    warn!("[DeviceSync] Background flush failed: {}", err);
                }
            }
        })
    }

    /// [`Self::spawn_flush_loop`] at the foreground cadence.
    pub fn start_background_flush(self: Arc<Self>) -> JoinHandle<()> {
        self.spawn_flush_loop(std::time::Duration::from_secs(CLIENT_FLUSH_INTERVAL_SECS))
    }

    /// Applies a batch verdict to the records that were sent. Returns true if
    /// the server copy of a confirmed record has to be pulled.
    async fn settle_chunk(
        &self,
        chunk: &[LocalRecord],
        result: &BatchResult,
        report: &mut FlushReport,
    ) -> Result<bool> {
        let targets: Vec<String> = chunk
            .iter()
            .map(|record| to_sync_item(record).descriptor())
            .collect();
        let failures = result.failures_for(&targets);
        let complete = result.errors_complete();

        let mut needs_pull = false;
        for (record, failure) in chunk.iter().zip(failures) {
            if let Some(message) = failure {
                self.reject(record, message).await?;
                report.rejected += 1;
            } else if !complete {
                // Truncated error list: this item may have failed unnamed.
                report.deferred += 1;
            } else {
                needs_pull |= self.confirm(record).await?;
                report.confirmed += 1;
            }
        }
        Ok(needs_pull)
    }

    async fn confirm(&self, sent: &LocalRecord) -> Result<bool> {
        let Some(current) = self.store.get(sent.entity, &sent.entity_id).await? else {
            return Ok(false);
        };
        if current.revision != sent.revision {
            // Edited again while the push was in flight; the newer edit is still pending.
            return Ok(false);
        }

        if current.deleted {
            self.store.remove(current.entity, &current.entity_id).await?;
        } else {
            let mut record = current;
            record.sync_status = record.sync_status.transition(SyncStatusEvent::Confirmed)?;
            record.operation = SyncOperation::Update;
            record.retry_count = 0;
            record.next_retry_at = None;
            record.last_error = None;
            self.store.put(record).await?;
        }
        self.discard_queued(sent.entity, &sent.entity_id).await
    }

    async fn reject(&self, sent: &LocalRecord, message: &str) -> Result<()> {
        let Some(mut record) = self.store.get(sent.entity, &sent.entity_id).await? else {
            return Ok(());
        };
        if record.revision != sent.revision {
            return Ok(());
        }
        record.sync_status = record.sync_status.transition(SyncStatusEvent::Rejected)?;
        record.last_error = Some(message.to_string());
        self.store.put(record).await
    }

    async fn schedule_retry(&self, chunk: &[LocalRecord], message: &str) -> Result<()> {
        for sent in chunk {
            let Some(mut record) = self.store.get(sent.entity, &sent.entity_id).await? else {
                continue;
            };
            if record.revision != sent.revision {
                continue;
            }
            record.sync_status = record
                .sync_status
                .transition(SyncStatusEvent::TransientFailure)?;
            let delay = backoff_seconds(record.retry_count);
            record.retry_count = record.retry_count.saturating_add(1);
            record.next_retry_at = Some(format_timestamp(Utc::now() + Duration::seconds(delay)));
            record.last_error = Some(message.to_string());
            self.store.put(record).await?;
        }
        Ok(())
    }

    /// Drops changes parked while the record was unsettled. They were written
    /// before the push the server just accepted, so the record is pulled
    /// instead. Returns true when a pull is needed.
    async fn discard_queued(&self, entity: SyncEntity, entity_id: &str) -> Result<bool> {
        let parked = self.store.take_queued(entity, entity_id).await?;
        if parked.is_empty() {
            return Ok(false);
        }
        debug!(
            "[DeviceSync] Dropped {} parked change(s) for {}/{}; pulling server copy",
            parked.len(),
            entity,
            entity_id
        );
        Ok(true)
    }

    /// Applies a change received from the server.
    ///
    /// Records holding unsynced local input are never overwritten; the change
    /// is parked and superseded by a pull once the local write is confirmed.
    /// Otherwise the change wins unless it is older than the local copy.
    pub async fn apply_remote_change(&self, change: EntityChange) -> Result<RemoteApply> {
        let local = self.store.get(change.entity, &change.entity_id).await?;
        if let Some(record) = &local {
            if record.sync_status.has_unsynced_input() {
                debug!(
                    "[DeviceSync] Parking remote change for {}/{} ({})",
                    change.entity, change.entity_id, record.sync_status
                );
                self.store.queue_remote(change).await?;
                return Ok(RemoteApply::Queued);
            }
            if !should_apply_lww(&record.updated_at, &change.updated_at) {
                return Ok(RemoteApply::Ignored);
            }
        }

        if change.deleted {
            if local.is_some() {
                self.store.remove(change.entity, &change.entity_id).await?;
            }
            return Ok(RemoteApply::Applied);
        }

        let Some(data) = change.data else {
            return Err(DeviceSyncError::invalid_request(format!(
                "Remote change for {}/{} carries no data",
                change.entity, change.entity_id
            )));
        };
        let revision = local.map_or(0, |record| record.revision);
        self.store
            .put(LocalRecord {
                entity: change.entity,
                entity_id: change.entity_id,
                data,
                sync_status: SyncStatus::Synced,
                operation: SyncOperation::Update,
                deleted: false,
                updated_at: change.updated_at,
                revision,
                retry_count: 0,
                next_retry_at: None,
                last_error: None,
            })
            .await?;
        Ok(RemoteApply::Applied)
    }

    /// Handles a realtime notification, which names a change but carries no
    /// field data.
    pub async fn handle_notification(&self, change: SyncChange) -> Result<RemoteApply> {
        let local = self.store.get(change.entity, &change.entity_id).await?;
        let as_entity_change = EntityChange {
            entity: change.entity,
            entity_id: change.entity_id,
            deleted: change.operation.is_delete(),
            updated_at: change.updated_at,
            data: None,
        };

        match local {
            Some(record) if record.sync_status.has_unsynced_input() => {
                self.store.queue_remote(as_entity_change).await?;
                Ok(RemoteApply::Queued)
            }
            Some(record) if !should_apply_lww(&record.updated_at, &as_entity_change.updated_at) => {
                Ok(RemoteApply::Ignored)
            }
            _ if as_entity_change.deleted => self.apply_remote_change(as_entity_change).await,
            _ => {
                self.pull().await?;
                Ok(RemoteApply::Applied)
            }
        }
    }

    /// Moves every `error` record back to `pending`. Returns how many moved.
    pub async fn retry_failed(&self) -> Result<usize> {
        let failed = self.store.list_by_status(SyncStatus::Error).await?;
        let count = failed.len();
        for mut record in failed {
            record.sync_status = record.sync_status.transition(SyncStatusEvent::UserRetry)?;
            record.retry_count = 0;
            record.next_retry_at = None;
            self.store.put(record).await?;
        }
        Ok(count)
    }

    /// Fetches the change feed from the stored cursor and applies it.
    pub async fn pull(&self) -> Result<usize> {
        let mut applied = 0;
        for _ in 0..MAX_PULL_PAGES {
            let cursor = self.store.cursor().await?;
            let feed = self
                .transport
                .pull_changes(cursor.clone(), Some(DEFAULT_CHANGE_FEED_LIMIT))
                .await?;
            let page_len = feed.changes.len();

            for change in feed.changes {
                if self.apply_remote_change(change).await? == RemoteApply::Applied {
                    applied += 1;
                }
            }
            let advanced = feed.cursor.is_some() && feed.cursor != cursor;
            if advanced {
                self.store.set_cursor(feed.cursor).await?;
            }
            if !advanced || page_len < DEFAULT_CHANGE_FEED_LIMIT as usize {
                break;
            }
        }
        debug!("[DeviceSync] Pulled and applied {} change(s)", applied);
        Ok(applied)
    }
}

fn to_sync_item(record: &LocalRecord) -> SyncItem {
    SyncItem {
        entity_type: record.entity.as_str().to_string(),
        entity_id: record.entity_id.clone(),
        operation: if record.deleted {
            SyncOperation::Delete
        } else {
            record.operation
        },
        data: (!record.deleted).then(|| record.data.clone()),
    }
}
