mod model;
mod repository;

pub use model::{NewSubscriptionDB, SubscriptionDB, SubscriptionFieldsDB};
pub use repository::SubscriptionRepository;
