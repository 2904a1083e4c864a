//! Storage-level errors and their mapping into the core taxonomy.

use diesel::result::Error as DieselError;
use ledgerbox_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] DieselError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(DieselError::NotFound) => {
                Error::NotFound("Record not found".to_string())
            }
            StorageError::Query(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::Connection(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::Pool(e) => Error::Database(DatabaseError::ConnectionFailed(e.to_string())),
            StorageError::Migration(msg) => Error::Database(DatabaseError::MigrationFailed(msg)),
            StorageError::Io(e) => Error::Database(DatabaseError::Internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_its_meaning() {
        let err: Error = StorageError::from(DieselError::NotFound).into();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn other_failures_are_internal() {
        let err: Error = StorageError::Migration("boom".into()).into();
        assert!(err.is_internal());
    }
}
