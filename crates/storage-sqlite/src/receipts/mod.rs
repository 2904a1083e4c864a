mod model;
mod repository;

pub use model::{NewReceiptDB, ReceiptDB, ReceiptFieldsDB};
pub use repository::ReceiptRepository;
