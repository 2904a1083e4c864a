//! Client side of ledgerbox device sync.
//!
//! Local writes land in a [`LocalStore`] as `pending`, are pushed in batches
//! by [`SyncReconciler::flush`], and remote changes are merged back with
//! last-writer-wins once the local copy is settled.

pub mod broadcast;
pub mod client;
pub mod error;
pub mod local_store;
pub mod reconciler;

pub use broadcast::{BroadcastHub, BroadcastMessage, TabHandle};
pub use client::{BearerTransport, SyncApiClient, SyncTransport};
pub use error::{ApiRetryClass, DeviceSyncError, Result};
pub use local_store::{LocalRecord, LocalStore, MemoryLocalStore};
pub use reconciler::{FlushReport, RemoteApply, SyncReconciler};
