//! Generic entity store: ownership check, insert-or-update, tombstone delete
//! and change feed, parameterized by a [`SyncTable`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use ledgerbox_core::errors::{Error, Result};
use ledgerbox_core::sync::{
    EntityChange, EntityStore, FeedBound, FeedCursor, SyncData, SyncEntity, SyncPayload,
    WriteOutcome,
};
use ledgerbox_core::utils::time_utils::{format_timestamp, now_timestamp};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;

/// Table-specific half of an entity store.
///
/// Every implementing table has `id`, `user_id`, `updated_at` and
/// `deleted_at` columns.
pub trait SyncTable: SyncPayload {
    const TABLE: &'static str;

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()>;

    /// Writes every field of the merged `payload` and clears any tombstone.
    fn update_row(
        conn: &mut SqliteConnection,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()>;

    /// Stored record in wire form, the base an update is merged onto.
    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData>;

    /// Rows past `bound`, ordered by `(updated_at, id)`.
    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>>;

    /// Runs in the delete transaction after the record was tombstoned.
    fn after_tombstone(
        _conn: &mut SqliteConnection,
        _user_id: &str,
        _entity_id: &str,
        _now: &str,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(QueryableByName)]
struct OwnerRow {
    #[diesel(sql_type = Text)]
    user_id: String,
}

fn find_owner(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity_id: &str,
) -> Result<Option<OwnerRow>> {
    let row = diesel::sql_query(format!(
        "SELECT user_id FROM {} WHERE id = ?",
        table
    ))
    .bind::<Text, _>(entity_id)
    .get_result::<OwnerRow>(conn)
    .optional()
    .map_err(StorageError::from)?;
    Ok(row)
}

/// Marks a live record as deleted. Returns the number of rows touched.
fn tombstone(
    conn: &mut SqliteConnection,
    table: &'static str,
    user_id: &str,
    entity_id: &str,
    now: &str,
) -> Result<usize> {
    let affected = diesel::sql_query(format!(
        "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
        table
    ))
    .bind::<Text, _>(now)
    .bind::<Text, _>(now)
    .bind::<Text, _>(entity_id)
    .bind::<Text, _>(user_id)
    .execute(conn)
    .map_err(StorageError::from)?;
    Ok(affected)
}

pub struct SqliteEntityStore<P> {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    _payload: PhantomData<fn() -> P>,
}

impl<P: SyncTable> SqliteEntityStore<P> {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self {
            pool,
            writer,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P: SyncTable> EntityStore<P> for SqliteEntityStore<P> {
    async fn upsert(
        &self,
        user_id: &str,
        entity_id: &str,
        data: SyncData,
    ) -> Result<WriteOutcome> {
        let user_id = user_id.to_string();
        let entity_id = entity_id.to_string();
        self.writer
            .exec(move |conn| {
                let now = now_timestamp();
                match find_owner(conn, P::TABLE, &entity_id)? {
                    Some(existing) if existing.user_id != user_id => {
                        return Err(Error::conflict(format!(
                            "{} {} belongs to another user",
                            P::ENTITY,
                            entity_id
                        )));
                    }
                    Some(_) => {
                        let stored = P::load_data(conn, &entity_id)?;
                        let payload = P::from_sync_data(&P::merge_update(stored, &data))?;
                        payload.ensure_insertable()?;
                        P::update_row(conn, &entity_id, payload, &now)?;
                    }
                    None => {
                        let payload = P::from_sync_data(&data)?;
                        payload.ensure_insertable()?;
                        P::insert_row(conn, &user_id, &entity_id, payload, &now)?;
                    }
                }
                Ok(WriteOutcome::Applied { updated_at: now })
            })
            .await
    }

    async fn delete(&self, user_id: &str, entity_id: &str) -> Result<WriteOutcome> {
        let user_id = user_id.to_string();
        let entity_id = entity_id.to_string();
        self.writer
            .exec(move |conn| {
                let now = now_timestamp();
                if tombstone(conn, P::TABLE, &user_id, &entity_id, &now)? == 0 {
                    debug!(
                        "[BatchSync] Delete of {}/{} was a no-op",
                        P::ENTITY,
                        entity_id
                    );
                    return Ok(WriteOutcome::Unchanged);
                }
                P::after_tombstone(conn, &user_id, &entity_id, &now)?;
                Ok(WriteOutcome::Applied { updated_at: now })
            })
            .await
    }

    async fn changes_since(
        &self,
        user_id: &str,
        after: Option<&FeedCursor>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut conn = get_connection(&self.pool)?;
        let bound = after.map(|cursor| cursor.bound_for(P::ENTITY));
        P::load_changes(&mut conn, user_id, bound, limit)
    }
}

pub(crate) fn entity_change(
    entity: SyncEntity,
    entity_id: String,
    updated_at: String,
    deleted_at: Option<String>,
    data: Value,
) -> EntityChange {
    let deleted = deleted_at.is_some();
    EntityChange {
        entity,
        entity_id,
        deleted,
        updated_at,
        data: (!deleted).then_some(data),
    }
}

/// Field map of a `to_data()` value.
pub(crate) fn data_object(value: Value) -> SyncData {
    match value {
        Value::Object(map) => map,
        _ => SyncData::new(),
    }
}

pub(crate) fn timestamp_text(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(format_timestamp)
}

pub(crate) fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|amount| amount.normalize().to_string())
}

pub(crate) fn decimal_json(value: Option<&str>) -> Value {
    value
        .and_then(|text| Decimal::from_str(text).ok())
        .and_then(|amount| serde_json::to_value(amount).ok())
        .unwrap_or(Value::Null)
}

pub(crate) fn json_text(value: Option<&str>) -> Value {
    value
        .and_then(|text| serde_json::from_str(text).ok())
        .unwrap_or(Value::Null)
}
