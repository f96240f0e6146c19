//! Last-known status snapshot shared between the worker and readers.

use std::sync::Arc;

use levin_engine_core::StatusSnapshot;
use tokio::sync::watch;

/// Single-writer, multi-reader holder of the latest [`StatusSnapshot`].
///
/// Snapshots are replaced whole; readers receive an `Arc` to an immutable
/// value and never observe fields from two different ticks. The cache is
/// empty before the first tick and after shutdown.
#[derive(Clone)]
pub struct StatusCache {
    sender: Arc<watch::Sender<Option<Arc<StatusSnapshot>>>>,
}

impl StatusCache {
    /// Construct an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Latest snapshot, if the engine has ticked since it started.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.sender.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<StatusSnapshot>>> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        self.sender.send_replace(Some(Arc::new(snapshot)));
    }

    pub(crate) fn clear(&self) {
        self.sender.send_replace(None);
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}
