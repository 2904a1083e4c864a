//! SQLite persistence for the ledgerbox sync backend.

pub mod db;
pub mod devices;
pub mod documents;
pub mod errors;
pub mod household_bills;
pub mod receipts;
pub mod reminders;
pub mod schema;
pub mod sessions;
pub mod subscriptions;
pub mod sync;

use std::sync::Arc;

use ledgerbox_core::sync::EntityHandlers;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;

/// Wires one SQLite store per entity kind into the handler table.
pub fn build_entity_handlers(pool: Arc<DbPool>, writer: WriteHandle) -> EntityHandlers {
    EntityHandlers::new(
        Arc::new(receipts::ReceiptRepository::new(pool.clone(), writer.clone())),
        Arc::new(devices::DeviceRepository::new(pool.clone(), writer.clone())),
        Arc::new(household_bills::HouseholdBillRepository::new(
            pool.clone(),
            writer.clone(),
        )),
        Arc::new(reminders::ReminderRepository::new(pool.clone(), writer.clone())),
        Arc::new(subscriptions::SubscriptionRepository::new(
            pool.clone(),
            writer.clone(),
        )),
        Arc::new(documents::DocumentRepository::new(pool, writer)),
    )
}
