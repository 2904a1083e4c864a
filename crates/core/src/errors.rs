//! Error taxonomy shared by every ledgerbox crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or a payload that fails the entity's shape constraints.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, invalid or expired credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not entitled.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The target exists in a state that forbids the write (e.g. owned by another user).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status code this error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Serialization(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::Database(_) | Self::Unexpected(_) => 500,
        }
    }

    /// True for faults the caller cannot fix by changing its input.
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::validation("bad").status_code(), 400);
        assert_eq!(Error::unauthorized("nope").status_code(), 401);
        assert_eq!(Error::Forbidden("x".into()).status_code(), 403);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::conflict("owner").status_code(), 409);
        assert_eq!(
            Error::RateLimited {
                retry_after_secs: 3
            }
            .status_code(),
            429
        );
        assert!(Error::Database(DatabaseError::Internal("boom".into())).is_internal());
    }

    #[test]
    fn validation_message_is_prefixed() {
        let err = Error::validation("totalAmount must not be negative");
        assert_eq!(
            err.to_string(),
            "Validation error: totalAmount must not be negative"
        );
    }
}
