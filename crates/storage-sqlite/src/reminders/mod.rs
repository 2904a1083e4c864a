mod model;
mod repository;

pub use model::{NewReminderDB, ReminderDB, ReminderFieldsDB};
pub use repository::ReminderRepository;
