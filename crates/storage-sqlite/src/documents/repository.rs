use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use ledgerbox_core::entities::DocumentPayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{DocumentDB, DocumentFieldsDB, NewDocumentDB};
use crate::errors::StorageError;
use crate::schema::documents;
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type DocumentRepository = SqliteEntityStore<DocumentPayload>;

impl SyncTable for DocumentPayload {
    const TABLE: &'static str = "documents";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewDocumentDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(documents::table)
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
        let fields = DocumentFieldsDB::from(payload);
        diesel::update(documents::table.find(entity_id))
            .set((
                &fields,
                documents::updated_at.eq(now),
                documents::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = documents::table
            .find(entity_id)
            .select(DocumentDB::as_select())
            .first::<DocumentDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = documents::table
            .filter(documents::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(documents::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(documents::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                documents::updated_at.gt(updated_at.clone()).or(documents::updated_at
                    .eq(updated_at)
                    .and(documents::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((documents::updated_at.asc(), documents::id.asc()))
            .limit(limit)
            .select(DocumentDB::as_select())
            .load::<DocumentDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::Document, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }
}
