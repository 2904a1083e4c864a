//! Sync scheduling constants shared by server and client.

/// Items processed concurrently per window by the batch coordinator.
pub const DEFAULT_SYNC_WINDOW_SIZE: usize = 5;

/// Maximum number of error descriptors returned in a batch result.
pub const MAX_BATCH_ERRORS: usize = 10;

/// Maximum number of pending records a client sends per batch request.
pub const CLIENT_FLUSH_BATCH_SIZE: usize = 50;

/// Foreground flush cadence in seconds.
pub const CLIENT_FLUSH_INTERVAL_SECS: u64 = 45;

/// Default page size of the change feed.
pub const DEFAULT_CHANGE_FEED_LIMIT: i64 = 500;

/// Upper bound for a single change feed page.
pub const MAX_CHANGE_FEED_LIMIT: i64 = 2_000;
