//! Sync status lifecycle of a client-resident record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Things that can happen to a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatusEvent {
    /// The user changed the record on this device.
    LocalEdit,
    /// The server acknowledged the pending write.
    Confirmed,
    /// The server rejected the pending write.
    Rejected,
    /// The push failed before reaching a verdict (network, 5xx, timeout).
    TransientFailure,
    /// The user asked to resend a rejected write.
    UserRetry,
}

impl SyncStatus {
    /// Applies `event`, rejecting transitions outside the lifecycle.
    ///
    /// In particular a `synced` record never becomes `error` without an
    /// intervening local edit.
    pub fn transition(self, event: SyncStatusEvent) -> Result<SyncStatus> {
        use SyncStatus::*;
        use SyncStatusEvent::*;

        match (self, event) {
            (Pending, Confirmed) => Ok(Synced),
            (Pending, Rejected) => Ok(Error),
            (Pending, TransientFailure) | (Pending, LocalEdit) => Ok(Pending),
            (Synced, LocalEdit) => Ok(Pending),
            (Error, UserRetry) | (Error, LocalEdit) => Ok(Pending),
            (status, event) => Err(crate::errors::Error::conflict(format!(
                "cannot apply {:?} to a {} record",
                event, status
            ))),
        }
    }

    /// Records that still hold user input the server has not accepted.
    pub fn has_unsynced_input(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}
