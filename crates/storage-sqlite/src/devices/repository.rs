use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use ledgerbox_core::entities::DevicePayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{DeviceDB, DeviceFieldsDB, NewDeviceDB};
use crate::errors::StorageError;
use crate::schema::{devices, reminders};
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type DeviceRepository = SqliteEntityStore<DevicePayload>;

impl SyncTable for DevicePayload {
    const TABLE: &'static str = "devices";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewDeviceDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(devices::table)
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
        let fields = DeviceFieldsDB::from(payload);
        diesel::update(devices::table.find(entity_id))
            .set((
                &fields,
                devices::updated_at.eq(now),
                devices::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = devices::table
            .find(entity_id)
            .select(DeviceDB::as_select())
            .first::<DeviceDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = devices::table
            .filter(devices::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(devices::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(devices::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                devices::updated_at.gt(updated_at.clone()).or(devices::updated_at
                    .eq(updated_at)
                    .and(devices::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((devices::updated_at.asc(), devices::id.asc()))
            .limit(limit)
            .select(DeviceDB::as_select())
            .load::<DeviceDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::Device, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }

    /// Reminders attached to a deleted device are tombstoned with it.
    fn after_tombstone(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        now: &str,
    ) -> Result<()> {
        let cascaded = diesel::update(
            reminders::table
                .filter(reminders::user_id.eq(user_id))
                .filter(reminders::device_id.eq(entity_id))
                .filter(reminders::deleted_at.is_null()),
        )
        .set((
            reminders::deleted_at.eq(now),
            reminders::updated_at.eq(now),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;

        if cascaded > 0 {
            debug!(
                "[BatchSync] Deleting device {} tombstoned {} reminder(s)",
                entity_id, cascaded
            );
        }
        Ok(())
    }
}
