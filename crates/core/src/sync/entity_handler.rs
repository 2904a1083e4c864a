//! Per-entity upsert/delete capability and its compile-time dispatch table.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::entities::{
    DevicePayload, DocumentPayload, HouseholdBillPayload, ReceiptPayload, ReminderPayload,
    SubscriptionPayload,
};
use crate::errors::{Error, Result};

use super::sync_model::{feed_order, EntityChange, FeedCursor, SyncData, SyncEntity};

/// Longest accepted caller-assigned entity id.
pub const MAX_ENTITY_ID_LEN: usize = 128;

/// Outcome of a single durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record changed; `updated_at` is its new server timestamp.
    Applied { updated_at: String },
    /// Nothing to do (e.g. deleting an unknown or already deleted id).
    Unchanged,
}

impl WriteOutcome {
    pub fn updated_at(&self) -> Option<&str> {
        match self {
            WriteOutcome::Applied { updated_at } => Some(updated_at),
            WriteOutcome::Unchanged => None,
        }
    }
}

/// Typed, validated field set of one entity kind.
pub trait SyncPayload: Sized + Send + Sync + 'static {
    const ENTITY: SyncEntity;

    /// Parses a client data object and checks the kind's shape constraints.
    fn from_sync_data(data: &SyncData) -> Result<Self>;

    /// Wire names of required fields absent from this payload.
    fn missing_required(&self) -> Vec<&'static str>;

    /// Fails unless the payload can create a record on its own.
    fn ensure_insertable(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::validation(format!(
            "Missing required field(s) for {}: {}",
            Self::ENTITY,
            missing.join(", ")
        )))
    }

    /// Overlays an update onto the stored record. Present keys win, an
    /// explicit `null` clears the field and absent keys keep their value.
    fn merge_update(mut stored: SyncData, incoming: &SyncData) -> SyncData {
        for (key, value) in incoming {
            stored.insert(key.clone(), value.clone());
        }
        stored
    }
}

/// Deserializes a data object into `T`, reporting failures as validation errors.
pub fn parse_sync_data<T: DeserializeOwned>(entity: SyncEntity, data: &SyncData) -> Result<T> {
    serde_json::from_value(Value::Object(data.clone()))
        .map_err(|err| Error::validation(format!("Invalid {} data: {}", entity, err)))
}

/// Storage contract for one payload kind, scoped to an owning user.
#[async_trait]
pub trait EntityStore<P: SyncPayload>: Send + Sync {
    /// Insert-or-update keyed on `entity_id`. Fails with `Conflict` if the id
    /// belongs to another user.
    ///
    /// Updates go through [`SyncPayload::merge_update`] and the merged record
    /// is validated as a whole before it is written. A tombstoned record is
    /// revived.
    async fn upsert(&self, user_id: &str, entity_id: &str, data: SyncData)
        -> Result<WriteOutcome>;

    /// Tombstones the record. Unknown or already deleted ids are a no-op.
    async fn delete(&self, user_id: &str, entity_id: &str) -> Result<WriteOutcome>;

    /// Records (tombstones included) positioned after `after`, in feed order.
    async fn changes_since(
        &self,
        user_id: &str,
        after: Option<&FeedCursor>,
        limit: i64,
    ) -> Result<Vec<EntityChange>>;
}

/// Upsert/delete capability consumed by the batch coordinator.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    fn entity(&self) -> SyncEntity;

    async fn upsert(&self, user_id: &str, entity_id: &str, data: &SyncData)
        -> Result<WriteOutcome>;

    async fn delete(&self, user_id: &str, entity_id: &str) -> Result<WriteOutcome>;

    async fn changes_since(
        &self,
        user_id: &str,
        after: Option<&FeedCursor>,
        limit: i64,
    ) -> Result<Vec<EntityChange>>;
}

fn validate_entity_id(entity_id: &str) -> Result<()> {
    if entity_id.trim().is_empty() {
        return Err(Error::validation("entityId must not be empty"));
    }
    if entity_id.len() > MAX_ENTITY_ID_LEN {
        return Err(Error::validation(format!(
            "entityId must be at most {} characters",
            MAX_ENTITY_ID_LEN
        )));
    }
    Ok(())
}

/// Validates payloads of kind `P` and hands them to its store.
pub struct SyncHandler<P: SyncPayload> {
    store: Arc<dyn EntityStore<P>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: SyncPayload> SyncHandler<P> {
    pub fn new(store: Arc<dyn EntityStore<P>>) -> Self {
        Self {
            store,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P: SyncPayload> EntityHandler for SyncHandler<P> {
    fn entity(&self) -> SyncEntity {
        P::ENTITY
    }

    async fn upsert(
        &self,
        user_id: &str,
        entity_id: &str,
        data: &SyncData,
    ) -> Result<WriteOutcome> {
        validate_entity_id(entity_id)?;
        P::from_sync_data(data)?;
        self.store.upsert(user_id, entity_id, data.clone()).await
    }

    async fn delete(&self, user_id: &str, entity_id: &str) -> Result<WriteOutcome> {
        validate_entity_id(entity_id)?;
        self.store.delete(user_id, entity_id).await
    }

    async fn changes_since(
        &self,
        user_id: &str,
        after: Option<&FeedCursor>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        self.store.changes_since(user_id, after, limit).await
    }
}

/// One handler per entity kind; lookup is an exhaustive match.
#[derive(Clone)]
pub struct EntityHandlers {
    receipts: Arc<dyn EntityHandler>,
    devices: Arc<dyn EntityHandler>,
    household_bills: Arc<dyn EntityHandler>,
    reminders: Arc<dyn EntityHandler>,
    subscriptions: Arc<dyn EntityHandler>,
    documents: Arc<dyn EntityHandler>,
}

impl EntityHandlers {
    pub fn new(
        receipts: Arc<dyn EntityStore<ReceiptPayload>>,
        devices: Arc<dyn EntityStore<DevicePayload>>,
        household_bills: Arc<dyn EntityStore<HouseholdBillPayload>>,
        reminders: Arc<dyn EntityStore<ReminderPayload>>,
        subscriptions: Arc<dyn EntityStore<SubscriptionPayload>>,
        documents: Arc<dyn EntityStore<DocumentPayload>>,
    ) -> Self {
        Self {
            receipts: Arc::new(SyncHandler::new(receipts)),
            devices: Arc::new(SyncHandler::new(devices)),
            household_bills: Arc::new(SyncHandler::new(household_bills)),
            reminders: Arc::new(SyncHandler::new(reminders)),
            subscriptions: Arc::new(SyncHandler::new(subscriptions)),
            documents: Arc::new(SyncHandler::new(documents)),
        }
    }

    pub fn handler(&self, entity: SyncEntity) -> &Arc<dyn EntityHandler> {
        match entity {
            SyncEntity::Receipt => &self.receipts,
            SyncEntity::Device => &self.devices,
            SyncEntity::HouseholdBill => &self.household_bills,
            SyncEntity::Reminder => &self.reminders,
            SyncEntity::Subscription => &self.subscriptions,
            SyncEntity::Document => &self.documents,
        }
    }

    /// Change feed across all kinds, merged in feed order and truncated to `limit`.
    pub async fn changes_since(
        &self,
        user_id: &str,
        after: Option<&FeedCursor>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut changes = Vec::new();
        for entity in SyncEntity::ALL {
            let mut batch = self
                .handler(entity)
                .changes_since(user_id, after, limit)
                .await?;
            changes.append(&mut batch);
        }
        changes.sort_by(feed_order);
        changes.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(changes)
    }
}
