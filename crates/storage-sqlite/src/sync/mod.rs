//! SQLite implementation of the per-entity sync stores.

mod entity_store;

pub use entity_store::{SqliteEntityStore, SyncTable};
pub(crate) use entity_store::{
    data_object, decimal_json, decimal_text, entity_change, json_text, timestamp_text,
};
