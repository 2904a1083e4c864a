mod model;
mod repository;

pub use model::{DocumentDB, DocumentFieldsDB, NewDocumentDB};
pub use repository::DocumentRepository;
