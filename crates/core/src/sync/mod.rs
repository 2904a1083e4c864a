//! Sync domain models and services.

mod batch_sync_service;
mod entity_handler;
mod local_sync_model;
mod notifier;
mod retry_policy;
mod sync_model;
mod sync_scheduler;

pub use batch_sync_service::*;
pub use entity_handler::*;
pub use local_sync_model::*;
pub use notifier::*;
pub use retry_policy::*;
pub use sync_model::*;
pub use sync_scheduler::*;
