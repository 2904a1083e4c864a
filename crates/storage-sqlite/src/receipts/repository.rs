use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use ledgerbox_core::entities::ReceiptPayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{NewReceiptDB, ReceiptDB, ReceiptFieldsDB};
use crate::errors::StorageError;
use crate::schema::receipts;
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type ReceiptRepository = SqliteEntityStore<ReceiptPayload>;

impl SyncTable for ReceiptPayload {
    const TABLE: &'static str = "receipts";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewReceiptDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(receipts::table)
            .values(&row)
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn update_row(
        conn: &mut SqliteConnection,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let fields = ReceiptFieldsDB::from(payload);
        diesel::update(receipts::table.find(entity_id))
            .set((
                &fields,
                receipts::updated_at.eq(now),
                receipts::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = receipts::table
            .find(entity_id)
            .select(ReceiptDB::as_select())
            .first::<ReceiptDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = receipts::table
            .filter(receipts::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(receipts::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(receipts::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                receipts::updated_at.gt(updated_at.clone()).or(receipts::updated_at
                    .eq(updated_at)
                    .and(receipts::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((receipts::updated_at.asc(), receipts::id.asc()))
            .limit(limit)
            .select(ReceiptDB::as_select())
            .load::<ReceiptDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::Receipt, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }
}
