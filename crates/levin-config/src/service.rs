//! Live settings distribution.
//!
//! # Design
//! - One [`SettingsHandle`] owns the on-disk source and publishes snapshots
//!   through a `watch` channel.
//! - Subscribers observe only changed configurations; unchanged reloads are
//!   not republished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::ConfigResult;
use crate::loader::load;
use crate::model::LevinConfig;

/// Shared handle to the active configuration.
#[derive(Clone, Debug)]
pub struct SettingsHandle {
    path: Option<PathBuf>,
    sender: Arc<watch::Sender<Arc<LevinConfig>>>,
}

impl SettingsHandle {
    /// Load the configuration from `path` (or the default location).
    ///
    /// # Errors
    ///
    /// Propagates loader and validation failures.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = load(path)?;
        Ok(Self::new(path.map(Path::to_path_buf), config))
    }

    /// Wrap an already-loaded configuration.
    #[must_use]
    pub fn new(path: Option<PathBuf>, config: LevinConfig) -> Self {
        let (sender, _receiver) = watch::channel(Arc::new(config));
        Self {
            path,
            sender: Arc::new(sender),
        }
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<LevinConfig> {
        self.sender.borrow().clone()
    }

    /// Stream of subsequent configuration changes.
    #[must_use]
    pub fn subscribe(&self) -> SettingsStream {
        let mut receiver = self.sender.subscribe();
        receiver.mark_unchanged();
        SettingsStream { receiver }
    }

    /// Publish `config` if it differs from the current snapshot.
    ///
    /// Returns `true` when subscribers were notified.
    pub fn replace(&self, config: LevinConfig) -> bool {
        self.sender.send_if_modified(|current| {
            if **current == config {
                false
            } else {
                *current = Arc::new(config);
                true
            }
        })
    }

    /// Re-read the configuration source and publish it when changed.
    ///
    /// # Errors
    ///
    /// Propagates loader and validation failures; the active configuration
    /// is left untouched in that case.
    pub fn reload(&self) -> ConfigResult<bool> {
        let config = load(self.path.as_deref())?;
        let changed = self.replace(config);
        info!(changed, "configuration reloaded");
        Ok(changed)
    }
}

/// Receiver side of [`SettingsHandle::subscribe`].
#[derive(Debug)]
pub struct SettingsStream {
    receiver: watch::Receiver<Arc<LevinConfig>>,
}

impl SettingsStream {
    /// Wait for the next configuration change. Returns `None` once every
    /// handle has been dropped.
    pub async fn next(&mut self) -> Option<Arc<LevinConfig>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
