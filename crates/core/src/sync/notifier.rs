use super::sync_model::SyncChange;

/// Receives a notification for every successfully applied batch item.
///
/// Publishing is best-effort: implementations must not block and a failure
/// to deliver never affects the batch result.
pub trait SyncChangeNotifier: Send + Sync {
    fn publish(&self, change: SyncChange);
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSyncNotifier;

impl SyncChangeNotifier for NoopSyncNotifier {
    fn publish(&self, _change: SyncChange) {}
}
