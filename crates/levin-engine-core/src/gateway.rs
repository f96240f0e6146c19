//! Contract required from the native engine.
//!
//! Every method is synchronous and non-reentrant. Implementations are moved
//! into the worker task exactly once and only ever called from there, so the
//! traits require `Send` but never `Sync`.

use std::path::Path;

use crate::error::EngineResult;
use crate::model::{EngineConfig, ItemSnapshot, StatusSnapshot};

/// Factory producing engine handles.
pub trait EngineConnector: Send + Sync {
    /// Identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Create a new engine handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::CreateFailed`] when the engine returns a
    /// null handle.
    fn create(&self, config: &EngineConfig) -> EngineResult<Box<dyn EngineGateway>>;
}

/// Live engine handle, owned exclusively by the worker.
pub trait EngineGateway: Send {
    /// Start the engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::StartFailed`] with the engine's status code.
    fn start(&mut self) -> EngineResult<()>;
    /// Stop the engine; the handle stays valid until [`EngineGateway::destroy`].
    fn stop(&mut self);
    /// Advance the engine state machine.
    fn tick(&mut self);
    /// Enable or disable all activity.
    fn set_enabled(&mut self, enabled: bool);
    /// Report whether the host is on AC power.
    fn update_battery(&mut self, on_ac_power: bool);
    /// Report current connectivity.
    fn update_network(&mut self, has_wifi: bool, has_cellular: bool);
    /// Report filesystem statistics for the data directory.
    fn update_storage(&mut self, fs_total: u64, fs_free: u64);
    /// Read the current status.
    fn status(&mut self) -> StatusSnapshot;
    /// Read per-item detail.
    fn items(&mut self) -> Vec<ItemSnapshot>;
    /// Register an item file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::ItemRejected`] when the engine refuses the file.
    fn add_item(&mut self, path: &Path) -> EngineResult<()>;
    /// Remove an item by info hash.
    fn remove_item(&mut self, id: &str);
    /// Set the download cap in KiB/s (`0` = unlimited).
    fn set_download_limit(&mut self, kbps: u32);
    /// Set the upload cap in KiB/s (`0` = unlimited).
    fn set_upload_limit(&mut self, kbps: u32);
    /// Allow or forbid running on battery.
    fn set_run_on_battery(&mut self, allowed: bool);
    /// Allow or forbid running on cellular.
    fn set_run_on_cellular(&mut self, allowed: bool);
    /// Update the disk budget inputs.
    fn set_disk_limits(
        &mut self,
        min_free_bytes: u64,
        min_free_percentage: f64,
        max_storage_bytes: u64,
    );
    /// Release the handle.
    fn destroy(self: Box<Self>);
}
