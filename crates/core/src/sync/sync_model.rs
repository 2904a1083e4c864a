//! Sync wire models shared by the server and the client library.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{Error, Result};
use crate::utils::time_utils::{format_timestamp, parse_datetime_str};

use super::sync_scheduler::MAX_BATCH_ERRORS;

/// Message returned when a batch body is not `{ items: SyncItem[] }`.
pub const INVALID_BATCH_REQUEST: &str = "Invalid request format - items array required";

/// Field map carried by create/update operations.
pub type SyncData = serde_json::Map<String, Value>;

/// Entity kinds that participate in device sync.
///
/// Declaration order is the tie-break order of the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncEntity {
    Receipt,
    Device,
    HouseholdBill,
    Reminder,
    Subscription,
    Document,
}

impl SyncEntity {
    pub const ALL: [SyncEntity; 6] = [
        SyncEntity::Receipt,
        SyncEntity::Device,
        SyncEntity::HouseholdBill,
        SyncEntity::Reminder,
        SyncEntity::Subscription,
        SyncEntity::Document,
    ];

    /// Wire name, as used in `entityType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEntity::Receipt => "receipt",
            SyncEntity::Device => "device",
            SyncEntity::HouseholdBill => "householdBill",
            SyncEntity::Reminder => "reminder",
            SyncEntity::Subscription => "subscription",
            SyncEntity::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entity| entity.as_str() == value)
    }
}

impl fmt::Display for SyncEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported sync operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, SyncOperation::Delete)
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation in a batch request.
///
/// `entity_type` stays a raw string: an unknown kind is a per-item failure,
/// not a malformed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncItem {
    pub fn upsert(
        entity: SyncEntity,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        data: Value,
    ) -> Self {
        Self {
            entity_type: entity.as_str().to_string(),
            entity_id: entity_id.into(),
            operation,
            data: Some(data),
        }
    }

    pub fn delete(entity: SyncEntity, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity.as_str().to_string(),
            entity_id: entity_id.into(),
            operation: SyncOperation::Delete,
            data: None,
        }
    }

    /// `entityType/entityId` prefix used in batch error descriptors.
    pub fn descriptor(&self) -> String {
        format!("{}/{}", self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<SyncItem>,
}

impl BatchRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|_| Error::validation(INVALID_BATCH_REQUEST))
    }
}

/// Summary of a processed batch. Failures are reported in-band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.success += 1;
    }

    /// Counts a failure; the descriptor is kept only while under the cap.
    pub fn record_failure(&mut self, descriptor: String) {
        self.failed += 1;
        if self.errors.len() < MAX_BATCH_ERRORS {
            self.errors.push(descriptor);
        }
    }

    /// True when every failed item is named in `errors`.
    pub fn errors_complete(&self) -> bool {
        self.errors.len() == self.failed
    }

    /// Attributes each reported error to one of `targets` (item descriptors).
    ///
    /// Ids may themselves contain `": "`, so an error belongs to the longest
    /// target it starts with. Returns one slot per target holding the failure
    /// message, if any.
    pub fn failures_for<'a>(&'a self, targets: &[String]) -> Vec<Option<&'a str>> {
        let mut found = vec![None; targets.len()];
        for error in &self.errors {
            let best = targets
                .iter()
                .enumerate()
                .filter(|(_, target)| {
                    error
                        .strip_prefix(target.as_str())
                        .is_some_and(|rest| rest.starts_with(": "))
                })
                .max_by_key(|(_, target)| target.len());
            if let Some((index, target)) = best {
                found[index] = Some(&error[target.len() + 2..]);
            }
        }
        found
    }
}

/// Notification published after a successful server-side write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChange {
    pub user_id: String,
    #[serde(rename = "entityType")]
    pub entity: SyncEntity,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub updated_at: String,
}

/// One record in the change feed. Tombstones carry `deleted = true` and no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    #[serde(rename = "entityType")]
    pub entity: SyncEntity,
    pub entity_id: String,
    pub deleted: bool,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeed {
    pub changes: Vec<EntityChange>,
    /// Encoded [`FeedCursor`] of the last change, to be passed back as `since`.
    pub cursor: Option<String>,
}

/// Position in the change feed.
///
/// Feed order is `(updatedAt, entityType, entityId)`, so records written in
/// the same millisecond (a device and its cascaded reminders) keep a stable
/// order across pages. Encoded as `updatedAt|entityType|entityId`; a bare
/// timestamp means "everything strictly after this instant".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub updated_at: String,
    pub position: Option<(SyncEntity, String)>,
}

/// Row filter one entity table applies for a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedBound {
    /// `updated_at > ts`
    After(String),
    /// `updated_at >= ts`
    AtOrAfter(String),
    /// `updated_at > ts OR (updated_at = ts AND id > entity_id)`
    AfterId { updated_at: String, entity_id: String },
}

impl FeedCursor {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("Invalid since cursor: {}", raw));
        let mut parts = raw.trim().splitn(3, '|');
        let updated_at = parts
            .next()
            .and_then(parse_datetime_str)
            .map(format_timestamp)
            .ok_or_else(invalid)?;
        let position = match (parts.next(), parts.next()) {
            (None, _) => None,
            (Some(entity), Some(entity_id)) if !entity_id.is_empty() => {
                let entity = SyncEntity::parse(entity).ok_or_else(invalid)?;
                Some((entity, entity_id.to_string()))
            }
            _ => return Err(invalid()),
        };
        Ok(Self {
            updated_at,
            position,
        })
    }

    pub fn from_change(change: &EntityChange) -> Self {
        Self {
            updated_at: change.updated_at.clone(),
            position: Some((change.entity, change.entity_id.clone())),
        }
    }

    pub fn encode(&self) -> String {
        match &self.position {
            Some((entity, entity_id)) => format!("{}|{}|{}", self.updated_at, entity, entity_id),
            None => self.updated_at.clone(),
        }
    }

    pub fn bound_for(&self, entity: SyncEntity) -> FeedBound {
        let ts = self.updated_at.clone();
        match &self.position {
            None => FeedBound::After(ts),
            Some((cursor_entity, entity_id)) => match entity.cmp(cursor_entity) {
                std::cmp::Ordering::Less => FeedBound::After(ts),
                std::cmp::Ordering::Greater => FeedBound::AtOrAfter(ts),
                std::cmp::Ordering::Equal => FeedBound::AfterId {
                    updated_at: ts,
                    entity_id: entity_id.clone(),
                },
            },
        }
    }

    /// True when `change` sorts after this position.
    pub fn precedes(&self, change: &EntityChange) -> bool {
        let key = (change.updated_at.as_str(), change.entity, change.entity_id.as_str());
        match &self.position {
            None => key.0 > self.updated_at.as_str(),
            Some((entity, entity_id)) => {
                key > (self.updated_at.as_str(), *entity, entity_id.as_str())
            }
        }
    }
}

/// Total feed order: `(updatedAt, entityType, entityId)`.
pub fn feed_order(a: &EntityChange, b: &EntityChange) -> std::cmp::Ordering {
    (&a.updated_at, a.entity, &a.entity_id).cmp(&(&b.updated_at, b.entity, &b.entity_id))
}

/// Determines whether a remote copy should overwrite the local one.
///
/// Newer `updatedAt` wins; equal timestamps re-apply (the server copy is
/// authoritative). Falls back to lexical ordering for non-RFC 3339 values.
pub fn should_apply_lww(local_updated_at: &str, remote_updated_at: &str) -> bool {
    let local_parsed =
        chrono::DateTime::parse_from_rfc3339(local_updated_at).map(|dt| dt.timestamp_millis());
    let remote_parsed =
        chrono::DateTime::parse_from_rfc3339(remote_updated_at).map(|dt| dt.timestamp_millis());

    if let (Ok(local_ts), Ok(remote_ts)) = (local_parsed, remote_parsed) {
        return remote_ts >= local_ts;
    }

    remote_updated_at >= local_updated_at
}
