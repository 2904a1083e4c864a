//! Typed payloads for each synced entity kind.

mod devices;
mod documents;
mod household_bills;
mod receipts;
mod reminders;
mod subscriptions;
mod validation;

pub use devices::*;
pub use documents::*;
pub use household_bills::*;
pub use receipts::*;
pub use reminders::*;
pub use subscriptions::*;
