//! Batch sync coordinator: authenticates a request, fans its items out to the
//! entity handlers in bounded windows and aggregates a [`BatchResult`].

use futures::future::join_all;
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::TokenVerifierTrait;
use crate::errors::{Error, Result};

use super::entity_handler::{EntityHandlers, WriteOutcome};
use super::notifier::{NoopSyncNotifier, SyncChangeNotifier};
use super::sync_model::{
    BatchRequest, BatchResult, ChangeFeed, FeedCursor, SyncChange, SyncEntity, SyncItem,
    SyncOperation,
};
use super::sync_scheduler::{
    DEFAULT_CHANGE_FEED_LIMIT, DEFAULT_SYNC_WINDOW_SIZE, MAX_CHANGE_FEED_LIMIT,
};

/// Why a single batch item failed. Rendered after the `type/id: ` prefix.
#[derive(Debug, Error)]
pub enum SyncItemFailure {
    #[error("Unsupported entity type: {0}")]
    UnsupportedEntity(String),

    #[error("entityId is required")]
    MissingEntityId,

    #[error("Data is required for {0} operation")]
    MissingData(SyncOperation),

    #[error("Data must be an object for {0} operation")]
    DataNotObject(SyncOperation),

    #[error("{0}")]
    Rejected(Error),

    #[error("Internal error")]
    Internal,
}

impl From<Error> for SyncItemFailure {
    fn from(err: Error) -> Self {
        if err.is_internal() {
            SyncItemFailure::Internal
        } else {
            SyncItemFailure::Rejected(err)
        }
    }
}

type ItemOutcome = std::result::Result<Option<SyncChange>, SyncItemFailure>;

pub struct BatchSyncService {
    verifier: Arc<dyn TokenVerifierTrait>,
    handlers: EntityHandlers,
    window_size: usize,
    notifier: Arc<dyn SyncChangeNotifier>,
}

impl BatchSyncService {
    pub fn new(verifier: Arc<dyn TokenVerifierTrait>, handlers: EntityHandlers) -> Self {
        Self {
            verifier,
            handlers,
            window_size: DEFAULT_SYNC_WINDOW_SIZE,
            notifier: Arc::new(NoopSyncNotifier),
        }
    }

    /// Number of items processed concurrently. Values below 1 are raised to 1.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SyncChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Resolves the caller or fails with `Unauthorized`.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<String> {
        self.verifier
            .verify_token_from_header(authorization)
            .await?
            .ok_or_else(|| Error::unauthorized("Unauthorized"))
    }

    /// Authenticates, parses and applies one batch request.
    ///
    /// Request-level failures (`Unauthorized`, `Validation`) abort before any
    /// item is touched. Item failures are reported in the returned result.
    pub async fn process_batch(
        &self,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<BatchResult> {
        let user_id = self.authenticate(authorization).await?;
        self.process_body(&user_id, body).await
    }

    /// Parses and applies a batch for an already authenticated user.
    pub async fn process_body(&self, user_id: &str, body: &[u8]) -> Result<BatchResult> {
        let request = BatchRequest::from_slice(body)?;
        Ok(self.process_items(user_id, request.items).await)
    }

    pub async fn process_items(&self, user_id: &str, items: Vec<SyncItem>) -> BatchResult {
        let mut result = BatchResult::new(items.len());
        debug!(
            "[BatchSync] Processing {} item(s) for user {} in windows of {}",
            items.len(),
            user_id,
            self.window_size
        );

        for window in items.chunks(self.window_size) {
            let futures: Vec<_> = window
                .iter()
                .map(|item| {
                    AssertUnwindSafe(self.process_item(user_id, item))
                        .catch_unwind()
                        .map(move |caught| {
                            caught.unwrap_or_else(|_| {
                                error!("[BatchSync] Handler panicked for {}", item.descriptor());
                                Err(SyncItemFailure::Internal)
                            })
                        })
                        .boxed()
                })
                .collect();
            let outcomes = join_all(futures).await;

            for (item, outcome) in window.iter().zip(outcomes) {
                match outcome {
                    Ok(change) => {
                        result.record_success();
                        if let Some(change) = change {
                            self.notifier.publish(change);
                        }
                    }
                    Err(failure) => {
                        debug!("[BatchSync] {} failed: {}", item.descriptor(), failure);
                        result.record_failure(format!("{}: {}", item.descriptor(), failure));
                    }
                }
            }
        }

        if result.failed > 0 {
            warn!(
                "[BatchSync] Batch for user {} finished with {}/{} failure(s)",
                user_id, result.failed, result.total
            );
        } else {
            info!(
                "[BatchSync] Batch for user {} applied {} item(s)",
                user_id, result.success
            );
        }
        result
    }

    async fn process_item(&self, user_id: &str, item: &SyncItem) -> ItemOutcome {
        let entity = SyncEntity::parse(&item.entity_type)
            .ok_or_else(|| SyncItemFailure::UnsupportedEntity(item.entity_type.clone()))?;
        if item.entity_id.trim().is_empty() {
            return Err(SyncItemFailure::MissingEntityId);
        }

        let handler = self.handlers.handler(entity);
        let outcome = match item.operation {
            SyncOperation::Delete => handler.delete(user_id, &item.entity_id).await,
            operation @ (SyncOperation::Create | SyncOperation::Update) => {
                let data = match item.data.as_ref() {
                    None | Some(serde_json::Value::Null) => {
                        return Err(SyncItemFailure::MissingData(operation))
                    }
                    Some(serde_json::Value::Object(map)) => map,
                    Some(_) => return Err(SyncItemFailure::DataNotObject(operation)),
                };
                handler.upsert(user_id, &item.entity_id, data).await
            }
        }
        .map_err(|err| {
            if err.is_internal() {
                error!("[BatchSync] {} failed: {}", item.descriptor(), err);
            }
            SyncItemFailure::from(err)
        })?;

        Ok(match outcome {
            WriteOutcome::Applied { updated_at } => Some(SyncChange {
                user_id: user_id.to_string(),
                entity,
                entity_id: item.entity_id.clone(),
                operation: item.operation,
                updated_at,
            }),
            WriteOutcome::Unchanged => None,
        })
    }

    /// Authenticated change feed across every entity kind.
    ///
    /// `since` is a cursor returned by an earlier page or a bare timestamp.
    pub async fn changes_since(
        &self,
        authorization: Option<&str>,
        since: Option<&str>,
        limit: Option<i64>,
    ) -> Result<ChangeFeed> {
        let user_id = self.authenticate(authorization).await?;
        let after = since
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(FeedCursor::parse)
            .transpose()?;
        let limit = limit
            .unwrap_or(DEFAULT_CHANGE_FEED_LIMIT)
            .clamp(1, MAX_CHANGE_FEED_LIMIT);

        let changes = self
            .handlers
            .changes_since(&user_id, after.as_ref(), limit)
            .await?;
        let cursor = changes
            .last()
            .map(FeedCursor::from_change)
            .or(after)
            .map(|cursor| cursor.encode());
        Ok(ChangeFeed { changes, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        DevicePayload, DocumentPayload, HouseholdBillPayload, ReceiptPayload, ReminderPayload,
        SubscriptionPayload,
    };
    use crate::sync::{feed_order, EntityChange, EntityStore, SyncData, SyncPayload, MAX_BATCH_ERRORS};
    use crate::utils::time_utils::now_timestamp;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Row {
        owner: String,
        deleted: bool,
        updated_at: String,
    }

    #[derive(Default)]
    struct InFlight {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    struct MemoryStore {
        entity: SyncEntity,
        rows: Mutex<HashMap<String, Row>>,
        in_flight_counter: Arc<InFlight>,
        panic_on: Option<String>,
    }

    impl MemoryStore {
        fn new(entity: SyncEntity, in_flight_counter: Arc<InFlight>) -> Self {
            Self {
                entity,
                rows: Mutex::new(HashMap::new()),
                in_flight_counter,
                panic_on: None,
            }
        }

        async fn track(&self) {
            let now = self.in_flight_counter.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight_counter.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight_counter.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl<P: SyncPayload> EntityStore<P> for MemoryStore {
        async fn upsert(
            &self,
            user_id: &str,
            entity_id: &str,
            data: SyncData,
        ) -> Result<WriteOutcome> {
            self.track().await;
            if self.panic_on.as_deref() == Some(entity_id) {
                panic!("store blew up");
            }
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(entity_id) {
                Some(row) if row.owner != user_id => {
                    Err(Error::conflict(format!("{} is owned by another user", entity_id)))
                }
                Some(row) => {
                    row.deleted = false;
                    row.updated_at = now_timestamp();
                    Ok(WriteOutcome::Applied {
                        updated_at: row.updated_at.clone(),
                    })
                }
                None => {
                    P::from_sync_data(&data)?.ensure_insertable()?;
                    let updated_at = now_timestamp();
                    rows.insert(
                        entity_id.to_string(),
                        Row {
                            owner: user_id.to_string(),
                            deleted: false,
                            updated_at: updated_at.clone(),
                        },
                    );
                    Ok(WriteOutcome::Applied { updated_at })
                }
            }
        }

        async fn delete(&self, user_id: &str, entity_id: &str) -> Result<WriteOutcome> {
            self.track().await;
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(entity_id) {
                Some(row) if row.owner == user_id && !row.deleted => {
                    row.deleted = true;
                    row.updated_at = now_timestamp();
                    Ok(WriteOutcome::Applied {
                        updated_at: row.updated_at.clone(),
                    })
                }
                _ => Ok(WriteOutcome::Unchanged),
            }
        }

        async fn changes_since(
            &self,
            user_id: &str,
            after: Option<&FeedCursor>,
            limit: i64,
        ) -> Result<Vec<EntityChange>> {
            let rows = self.rows.lock().unwrap();
            let mut changes: Vec<EntityChange> = rows
                .iter()
                .filter(|(_, row)| row.owner == user_id)
                .map(|(id, row)| EntityChange {
                    entity: self.entity,
                    entity_id: id.clone(),
                    deleted: row.deleted,
                    updated_at: row.updated_at.clone(),
                    data: None,
                })
                .filter(|change| after.map_or(true, |cursor| cursor.precedes(change)))
                .collect();
            changes.sort_by(feed_order);
            changes.truncate(usize::try_from(limit).unwrap_or(0));
            Ok(changes)
        }
    }

    struct FixedVerifier;

    #[async_trait]
    impl TokenVerifierTrait for FixedVerifier {
        async fn verify_token_from_header(
            &self,
            header_value: Option<&str>,
        ) -> Result<Option<String>> {
            Ok(match header_value {
                Some("Bearer alice") => Some("alice".to_string()),
                Some("Bearer bob") => Some("bob".to_string()),
                _ => None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<SyncChange>>);

    impl SyncChangeNotifier for RecordingNotifier {
        fn publish(&self, change: SyncChange) {
            self.0.lock().unwrap().push(change);
        }
    }

    fn store(entity: SyncEntity, in_flight_counter: &Arc<InFlight>) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(entity, in_flight_counter.clone()))
    }

    fn service_with(receipts: Arc<MemoryStore>, in_flight_counter: &Arc<InFlight>) -> BatchSyncService {
        let handlers = EntityHandlers::new(
            receipts as Arc<dyn EntityStore<ReceiptPayload>>,
            store(SyncEntity::Device, in_flight_counter) as Arc<dyn EntityStore<DevicePayload>>,
            store(SyncEntity::HouseholdBill, in_flight_counter) as Arc<dyn EntityStore<HouseholdBillPayload>>,
            store(SyncEntity::Reminder, in_flight_counter) as Arc<dyn EntityStore<ReminderPayload>>,
            store(SyncEntity::Subscription, in_flight_counter) as Arc<dyn EntityStore<SubscriptionPayload>>,
            store(SyncEntity::Document, in_flight_counter) as Arc<dyn EntityStore<DocumentPayload>>,
        );
        BatchSyncService::new(Arc::new(FixedVerifier), handlers)
    }

    fn service() -> BatchSyncService {
        let in_flight_counter = Arc::new(InFlight::default());
        service_with(store(SyncEntity::Receipt, &in_flight_counter), &in_flight_counter)
    }

    fn receipt(id: &str) -> Value {
        json!({
            "entityType": "receipt",
            "entityId": id,
            "operation": "create",
            "data": { "merchantName": "Test", "totalAmount": 100 }
        })
    }

    fn body(items: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({ "items": items })).unwrap()
    }

    #[tokio::test]
    async fn missing_or_invalid_token_processes_nothing() {
        let service = service();
        for header in [None, Some("Bearer nobody"), Some("Basic alice")] {
            let err = service
                .process_batch(header, &body(vec![receipt("r1")]))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Unauthorized(_)));
        }
        let feed = service
            .changes_since(Some("Bearer alice"), None, None)
            .await
            .unwrap();
        assert!(feed.changes.is_empty());
    }

    #[tokio::test]
    async fn auth_is_checked_before_body_shape() {
        let err = service()
            .process_batch(None, b"not json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let err = service()
            .process_batch(Some("Bearer alice"), br#"{"entries":[]}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn replaying_a_batch_is_idempotent() {
        let service = service();
        let payload = body(vec![receipt("r1"), receipt("r2")]);
        for _ in 0..2 {
            let result = service
                .process_batch(Some("Bearer alice"), &payload)
                .await
                .unwrap();
            assert_eq!((result.success, result.failed, result.total), (2, 0, 2));
        }
        let feed = service
            .changes_since(Some("Bearer alice"), None, None)
            .await
            .unwrap();
        assert_eq!(feed.changes.len(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let service = service();
        let delete = json!({ "entityType": "receipt", "entityId": "r1", "operation": "delete" });
        service
            .process_batch(Some("Bearer alice"), &body(vec![receipt("r1")]))
            .await
            .unwrap();
        for _ in 0..2 {
            let result = service
                .process_batch(Some("Bearer alice"), &body(vec![delete.clone()]))
                .await
                .unwrap();
            assert_eq!(result.success, 1);
            assert!(result.errors.is_empty());
        }
    }

    #[tokio::test]
    async fn failures_stay_isolated_to_their_item() {
        let result = service()
            .process_batch(
                Some("Bearer alice"),
                &body(vec![
                    receipt("r1"),
                    json!({ "entityType": "unknown", "entityId": "x", "operation": "create", "data": {} }),
                    json!({ "entityType": "receipt", "entityId": "r2", "operation": "update" }),
                    json!({ "entityType": "receipt", "entityId": "r3", "operation": "create", "data": { "totalAmount": -5 } }),
                    receipt("r4"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!((result.success, result.failed, result.total), (2, 3, 5));
        assert_eq!(result.errors[0], "unknown/x: Unsupported entity type: unknown");
        assert_eq!(result.errors[1], "receipt/r2: Data is required for update operation");
        assert!(result.errors[2].starts_with("receipt/r3: Validation error"));
    }

    #[tokio::test]
    async fn error_list_is_capped() {
        let items = (0..25)
            .map(|i| json!({ "entityType": "nope", "entityId": format!("n{i}"), "operation": "delete" }))
            .collect();
        let result = service()
            .process_batch(Some("Bearer alice"), &body(items))
            .await
            .unwrap();
        assert_eq!(result.failed, 25);
        assert_eq!(result.errors.len(), MAX_BATCH_ERRORS);
    }

    #[tokio::test]
    async fn ids_owned_by_another_user_conflict() {
        let service = service();
        service
            .process_batch(Some("Bearer alice"), &body(vec![receipt("shared")]))
            .await
            .unwrap();
        let result = service
            .process_batch(Some("Bearer bob"), &body(vec![receipt("shared")]))
            .await
            .unwrap();
        assert_eq!(result.failed, 1);
        assert!(result.errors[0].starts_with("receipt/shared: Conflict"));

        let feed = service
            .changes_since(Some("Bearer bob"), None, None)
            .await
            .unwrap();
        assert!(feed.changes.is_empty());
    }

    #[tokio::test]
    async fn windows_bound_concurrency() {
        let in_flight_counter = Arc::new(InFlight::default());
        let service = service_with(store(SyncEntity::Receipt, &in_flight_counter), &in_flight_counter).with_window_size(3);
        let items = (0..7).map(|i| receipt(&format!("r{i}"))).collect();
        let result = service
            .process_batch(Some("Bearer alice"), &body(items))
            .await
            .unwrap();
        assert_eq!(result.success, 7);
        assert_eq!(in_flight_counter.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(service.with_window_size(0).window_size(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_fails_only_its_item() {
        let in_flight_counter = Arc::new(InFlight::default());
        let mut receipts = MemoryStore::new(SyncEntity::Receipt, in_flight_counter.clone());
        receipts.panic_on = Some("boom".to_string());
        let service = service_with(Arc::new(receipts), &in_flight_counter);

        let result = service
            .process_batch(
                Some("Bearer alice"),
                &body(vec![receipt("ok"), receipt("boom")]),
            )
            .await
            .unwrap();
        assert_eq!((result.success, result.failed), (1, 1));
        assert_eq!(result.errors, vec!["receipt/boom: Internal error".to_string()]);
    }

    #[tokio::test]
    async fn successful_items_are_published() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service().with_notifier(notifier.clone());
        service
            .process_batch(
                Some("Bearer alice"),
                &body(vec![
                    receipt("r1"),
                    json!({ "entityType": "receipt", "entityId": "ghost", "operation": "delete" }),
                ]),
            )
            .await
            .unwrap();

        let published = notifier.0.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].entity_id, "r1");
        assert_eq!(published[0].user_id, "alice");
    }

    #[tokio::test]
    async fn paging_one_change_at_a_time_sees_every_record() {
        let service = service();
        let items = (0..4).map(|i| receipt(&format!("r{i}"))).collect();
        service
            .process_batch(Some("Bearer alice"), &body(items))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let feed = service
                .changes_since(Some("Bearer alice"), cursor.as_deref(), Some(1))
                .await
                .unwrap();
            if feed.changes.is_empty() {
                assert_eq!(feed.cursor, cursor);
                break;
            }
            seen.extend(feed.changes.into_iter().map(|change| change.entity_id));
            cursor = feed.cursor;
        }
        seen.sort();
        assert_eq!(seen, vec!["r0", "r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn change_feed_rejects_garbage_cursor() {
        let err = service()
            .changes_since(Some("Bearer alice"), Some("yesterday"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = service()
            .changes_since(Some("Bearer alice"), Some("2026-01-01|gadget|x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn process_body_skips_authentication() {
        let result = service()
            .process_body("alice", &body(vec![receipt("r1")]))
            .await
            .unwrap();
        assert_eq!(result.success, 1);
    }
}
