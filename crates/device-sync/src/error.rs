//! Error types for the device sync crate.

use thiserror::Error;

pub use ledgerbox_core::sync::SyncRetryClass as ApiRetryClass;
use ledgerbox_core::sync::classify_http_status;

/// Result type alias for device sync operations.
pub type Result<T> = std::result::Result<T, DeviceSyncError>;

/// Errors that can occur during device sync operations.
#[derive(Debug, Error)]
pub enum DeviceSyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the sync server
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Local offline store failure
    #[error("Local store error: {0}")]
    Store(String),

    /// Error raised by the shared domain layer
    #[error(transparent)]
    Core(#[from] ledgerbox_core::Error),
}

impl DeviceSyncError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
            Self::Store(_) => ApiRetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) | Self::Core(_) => ApiRetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = DeviceSyncError::api(401, "unauthorized");
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
        assert_eq!(DeviceSyncError::auth("no token").retry_class(), ApiRetryClass::ReauthRequired);
    }

    #[test]
    fn whole_batch_rejection_is_permanent() {
        let err = DeviceSyncError::api(400, "Invalid request format - items array required");
        assert_eq!(err.retry_class(), ApiRetryClass::Permanent);
        assert_eq!(err.status_code(), Some(400));
    }

    #[test]
    fn throttling_and_server_faults_are_retryable() {
        for status in [429, 500, 503] {
            assert_eq!(
                DeviceSyncError::api(status, "later").retry_class(),
                ApiRetryClass::Retryable
            );
        }
    }
}
