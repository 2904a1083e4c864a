use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use ledgerbox_core::entities::SubscriptionPayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{NewSubscriptionDB, SubscriptionDB, SubscriptionFieldsDB};
use crate::errors::StorageError;
use crate::schema::subscriptions;
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type SubscriptionRepository = SqliteEntityStore<SubscriptionPayload>;

impl SyncTable for SubscriptionPayload {
    const TABLE: &'static str = "subscriptions";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewSubscriptionDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(subscriptions::table)
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
        let fields = SubscriptionFieldsDB::from(payload);
        diesel::update(subscriptions::table.find(entity_id))
            .set((
                &fields,
                subscriptions::updated_at.eq(now),
                subscriptions::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = subscriptions::table
            .find(entity_id)
            .select(SubscriptionDB::as_select())
            .first::<SubscriptionDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(subscriptions::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(subscriptions::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                subscriptions::updated_at.gt(updated_at.clone()).or(subscriptions::updated_at
                    .eq(updated_at)
                    .and(subscriptions::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((subscriptions::updated_at.asc(), subscriptions::id.asc()))
            .limit(limit)
            .select(SubscriptionDB::as_select())
            .load::<SubscriptionDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::Subscription, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }
}
