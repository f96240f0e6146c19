//! Cooperative cancellation for fetch runs.

use tokio_util::sync::CancellationToken;

/// Cloneable cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct FetchCancel {
    token: CancellationToken,
}

impl FetchCancel {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Remaining items are abandoned; finished files
    /// are kept.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn waiters_wake_on_cancel() {
        let cancel = FetchCancel::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        tokio::task::yield_now().await;
        assert!(!cancel.is_cancelled());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("waiter joined");
        cancel.cancelled().await;
    }

    #[tokio::test]
    async fn cancel_before_waiting_resolves_at_once() {
        let cancel = FetchCancel::new();
        let observer = cancel.clone();
        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(50), observer.cancelled())
            .await
            .expect("already cancelled");
        assert!(observer.is_cancelled());
    }
}
