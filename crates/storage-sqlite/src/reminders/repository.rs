use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use ledgerbox_core::entities::ReminderPayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{NewReminderDB, ReminderDB, ReminderFieldsDB};
use crate::errors::StorageError;
use crate::schema::reminders;
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type ReminderRepository = SqliteEntityStore<ReminderPayload>;

impl SyncTable for ReminderPayload {
    const TABLE: &'static str = "reminders";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewReminderDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(reminders::table)
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
        let fields = ReminderFieldsDB::from(payload);
        diesel::update(reminders::table.find(entity_id))
            .set((
                &fields,
                reminders::updated_at.eq(now),
                reminders::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = reminders::table
            .find(entity_id)
            .select(ReminderDB::as_select())
            .first::<ReminderDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(reminders::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(reminders::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                reminders::updated_at.gt(updated_at.clone()).or(reminders::updated_at
                    .eq(updated_at)
                    .and(reminders::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((reminders::updated_at.asc(), reminders::id.asc()))
            .limit(limit)
            .select(ReminderDB::as_select())
            .load::<ReminderDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::Reminder, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }
}
