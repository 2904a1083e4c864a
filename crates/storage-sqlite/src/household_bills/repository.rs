use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use ledgerbox_core::entities::HouseholdBillPayload;
use ledgerbox_core::errors::Result;
use ledgerbox_core::sync::{EntityChange, FeedBound, SyncData, SyncEntity};

use super::model::{HouseholdBillDB, HouseholdBillFieldsDB, NewHouseholdBillDB};
use crate::errors::StorageError;
use crate::schema::household_bills;
use crate::sync::{data_object, entity_change, SqliteEntityStore, SyncTable};

pub type HouseholdBillRepository = SqliteEntityStore<HouseholdBillPayload>;

impl SyncTable for HouseholdBillPayload {
    const TABLE: &'static str = "household_bills";

    fn insert_row(
        conn: &mut SqliteConnection,
        user_id: &str,
        entity_id: &str,
        payload: Self,
        now: &str,
    ) -> Result<()> {
        let row = NewHouseholdBillDB {
            id: entity_id.to_string(),
            user_id: user_id.to_string(),
            fields: payload.into(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        diesel::insert_into(household_bills::table)
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
        let fields = HouseholdBillFieldsDB::from(payload);
        diesel::update(household_bills::table.find(entity_id))
            .set((
                &fields,
                household_bills::updated_at.eq(now),
                household_bills::deleted_at.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_data(conn: &mut SqliteConnection, entity_id: &str) -> Result<SyncData> {
        let row = household_bills::table
            .find(entity_id)
            .select(HouseholdBillDB::as_select())
            .first::<HouseholdBillDB>(conn)
            .map_err(StorageError::from)?;
        Ok(data_object(row.to_data()))
    }

    fn load_changes(
        conn: &mut SqliteConnection,
        user_id: &str,
        bound: Option<FeedBound>,
        limit: i64,
    ) -> Result<Vec<EntityChange>> {
        let mut query = household_bills::table
            .filter(household_bills::user_id.eq(user_id))
            .into_boxed();
        query = match bound {
            None => query,
            Some(FeedBound::After(ts)) => query.filter(household_bills::updated_at.gt(ts)),
            Some(FeedBound::AtOrAfter(ts)) => query.filter(household_bills::updated_at.ge(ts)),
            Some(FeedBound::AfterId {
                updated_at,
                entity_id,
            }) => query.filter(
                household_bills::updated_at.gt(updated_at.clone()).or(household_bills::updated_at
                    .eq(updated_at)
                    .and(household_bills::id.gt(entity_id))),
            ),
        };
        let rows = query
            .order((household_bills::updated_at.asc(), household_bills::id.asc()))
            .limit(limit)
            .select(HouseholdBillDB::as_select())
            .load::<HouseholdBillDB>(conn)
            .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let data = row.to_data();
                entity_change(SyncEntity::HouseholdBill, row.id, row.updated_at, row.deleted_at, data)
            })
            .collect())
    }
}
