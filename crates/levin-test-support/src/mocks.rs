//! Recording engine doubles.
//!
//! [`RecordingGateway`] logs every call in order and counts calls that
//! overlap with another call in flight, which lets tests assert that the
//! engine is only ever driven by one caller at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use levin_engine_core::{
    EngineConfig, EngineConnector, EngineError, EngineGateway, EngineResult, EngineState,
    ItemSnapshot, StatusSnapshot,
};

/// A single recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `tick`
    Tick,
    /// `set_enabled`
    SetEnabled(bool),
    /// `update_battery`
    UpdateBattery(bool),
    /// `update_network`
    UpdateNetwork {
        /// Wi-Fi flag.
        has_wifi: bool,
        /// Cellular flag.
        has_cellular: bool,
    },
    /// `update_storage`
    UpdateStorage {
        /// Filesystem size.
        fs_total: u64,
        /// Free bytes.
        fs_free: u64,
    },
    /// `status`
    Status,
    /// `items`
    Items,
    /// `add_item`
    AddItem(PathBuf),
    /// `remove_item`
    RemoveItem(String),
    /// `set_download_limit`
    SetDownloadLimit(u32),
    /// `set_upload_limit`
    SetUploadLimit(u32),
    /// `set_run_on_battery`
    SetRunOnBattery(bool),
    /// `set_run_on_cellular`
    SetRunOnCellular(bool),
    /// `set_disk_limits` (the percentage is not recorded)
    SetDiskLimits {
        /// Free-space floor in bytes.
        min_free_bytes: u64,
        /// Storage cap in bytes.
        max_storage_bytes: u64,
    },
    /// `destroy`
    Destroy,
}

#[derive(Default)]
struct Shared {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    live_handles: AtomicUsize,
    calls: Mutex<Vec<GatewayCall>>,
    state: Mutex<EngineState>,
    items: Mutex<Vec<PathBuf>>,
    reject_code: Mutex<Option<i32>>,
    call_delay: Mutex<Option<Duration>>,
}

/// Engine double that records calls; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    shared: Arc<Shared>,
}

impl RecordingGateway {
    /// Create a gateway with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.shared.calls).clone()
    }

    /// Number of calls that started while another call was still running.
    #[must_use]
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// Handles created through a [`RecordingConnector`] and not yet destroyed.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.shared.live_handles.load(Ordering::SeqCst)
    }

    /// State reported by subsequent `status` calls.
    pub fn set_state(&self, state: EngineState) {
        *lock(&self.shared.state) = state;
    }

    /// Make subsequent `add_item` calls fail with `code`.
    pub fn reject_items(&self, code: i32) {
        *lock(&self.shared.reject_code) = Some(code);
    }

    /// Hold every call for `delay`, widening any window for overlap.
    pub fn set_call_delay(&self, delay: Duration) {
        *lock(&self.shared.call_delay) = Some(delay);
    }

    fn record(&self, call: GatewayCall) {
        if self.shared.busy.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.shared.calls).push(call);
        let delay = *lock(&self.shared.call_delay);
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        self.shared.busy.store(false, Ordering::SeqCst);
    }
}

impl EngineGateway for RecordingGateway {
    fn start(&mut self) -> EngineResult<()> {
        self.record(GatewayCall::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.record(GatewayCall::Stop);
    }

    fn tick(&mut self) {
        self.record(GatewayCall::Tick);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.record(GatewayCall::SetEnabled(enabled));
    }

    fn update_battery(&mut self, on_ac_power: bool) {
        self.record(GatewayCall::UpdateBattery(on_ac_power));
    }

    fn update_network(&mut self, has_wifi: bool, has_cellular: bool) {
        self.record(GatewayCall::UpdateNetwork {
            has_wifi,
            has_cellular,
        });
    }

    fn update_storage(&mut self, fs_total: u64, fs_free: u64) {
        self.record(GatewayCall::UpdateStorage { fs_total, fs_free });
    }

    fn status(&mut self) -> StatusSnapshot {
        self.record(GatewayCall::Status);
        StatusSnapshot {
            state: *lock(&self.shared.state),
            item_count: u32::try_from(lock(&self.shared.items).len()).unwrap_or(u32::MAX),
            ..StatusSnapshot::default()
        }
    }

    fn items(&mut self) -> Vec<ItemSnapshot> {
        self.record(GatewayCall::Items);
        lock(&self.shared.items)
            .iter()
            .map(|path| ItemSnapshot {
                id: path.display().to_string(),
                name: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                ..ItemSnapshot::default()
            })
            .collect()
    }

    fn add_item(&mut self, path: &Path) -> EngineResult<()> {
        self.record(GatewayCall::AddItem(path.to_path_buf()));
        let reject = *lock(&self.shared.reject_code);
        if let Some(code) = reject {
            return Err(EngineError::ItemRejected {
                path: path.to_path_buf(),
                code,
            });
        }
        lock(&self.shared.items).push(path.to_path_buf());
        Ok(())
    }

    fn remove_item(&mut self, id: &str) {
        self.record(GatewayCall::RemoveItem(id.to_string()));
        lock(&self.shared.items).retain(|path| path.display().to_string() != id);
    }

    fn set_download_limit(&mut self, kbps: u32) {
        self.record(GatewayCall::SetDownloadLimit(kbps));
    }

    fn set_upload_limit(&mut self, kbps: u32) {
        self.record(GatewayCall::SetUploadLimit(kbps));
    }

    fn set_run_on_battery(&mut self, allowed: bool) {
        self.record(GatewayCall::SetRunOnBattery(allowed));
    }

    fn set_run_on_cellular(&mut self, allowed: bool) {
        self.record(GatewayCall::SetRunOnCellular(allowed));
    }

    fn set_disk_limits(
        &mut self,
        min_free_bytes: u64,
        _min_free_percentage: f64,
        max_storage_bytes: u64,
    ) {
        self.record(GatewayCall::SetDiskLimits {
            min_free_bytes,
            max_storage_bytes,
        });
    }

    fn destroy(self: Box<Self>) {
        self.record(GatewayCall::Destroy);
        let _ = self.shared.live_handles.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |live| live.checked_sub(1),
        );
    }
}

/// Connector handing out [`RecordingGateway`] clones that share one log.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    gateway: RecordingGateway,
    fail_create: bool,
    start_code: Option<i32>,
}

impl RecordingConnector {
    /// Connector whose handles record into `gateway`.
    #[must_use]
    pub const fn new(gateway: RecordingGateway) -> Self {
        Self {
            gateway,
            fail_create: false,
            start_code: None,
        }
    }

    /// Simulate a null handle from `create`.
    #[must_use]
    pub const fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Make `start` return the given non-zero status code.
    #[must_use]
    pub const fn failing_start(mut self, code: i32) -> Self {
        self.start_code = Some(code);
        self
    }
}

impl EngineConnector for RecordingConnector {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn create(&self, _config: &EngineConfig) -> EngineResult<Box<dyn EngineGateway>> {
        if self.fail_create {
            return Err(EngineError::CreateFailed {
                connector: "recording",
            });
        }
        self.gateway
            .shared
            .live_handles
            .fetch_add(1, Ordering::SeqCst);
        match self.start_code {
            Some(code) => Ok(Box::new(FailingStart {
                inner: self.gateway.clone(),
                code,
            })),
            None => Ok(Box::new(self.gateway.clone())),
        }
    }
}

struct FailingStart {
    inner: RecordingGateway,
    code: i32,
}

impl EngineGateway for FailingStart {
    fn start(&mut self) -> EngineResult<()> {
        self.inner.record(GatewayCall::Start);
        Err(EngineError::StartFailed { code: self.code })
    }
    fn stop(&mut self) {
        self.inner.stop();
    }
    fn tick(&mut self) {
        self.inner.tick();
    }
    fn set_enabled(&mut self, enabled: bool) {
        self.inner.set_enabled(enabled);
    }
    fn update_battery(&mut self, on_ac_power: bool) {
        self.inner.update_battery(on_ac_power);
    }
    fn update_network(&mut self, has_wifi: bool, has_cellular: bool) {
        self.inner.update_network(has_wifi, has_cellular);
    }
    fn update_storage(&mut self, fs_total: u64, fs_free: u64) {
        self.inner.update_storage(fs_total, fs_free);
    }
    fn status(&mut self) -> StatusSnapshot {
        self.inner.status()
    }
    fn items(&mut self) -> Vec<ItemSnapshot> {
        self.inner.items()
    }
    fn add_item(&mut self, path: &Path) -> EngineResult<()> {
        self.inner.add_item(path)
    }
    fn remove_item(&mut self, id: &str) {
        self.inner.remove_item(id);
    }
    fn set_download_limit(&mut self, kbps: u32) {
        self.inner.set_download_limit(kbps);
    }
    fn set_upload_limit(&mut self, kbps: u32) {
        self.inner.set_upload_limit(kbps);
    }
    fn set_run_on_battery(&mut self, allowed: bool) {
        self.inner.set_run_on_battery(allowed);
    }
    fn set_run_on_cellular(&mut self, allowed: bool) {
        self.inner.set_run_on_cellular(allowed);
    }
    fn set_disk_limits(
        &mut self,
        min_free_bytes: u64,
        min_free_percentage: f64,
        max_storage_bytes: u64,
    ) {
        self.inner
            .set_disk_limits(min_free_bytes, min_free_percentage, max_storage_bytes);
    }
    fn destroy(self: Box<Self>) {
        Box::new(self.inner).destroy();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_tracks_live_handles() -> anyhow::Result<()> {
        let gateway = RecordingGateway::new();
        let connector = RecordingConnector::new(gateway.clone());
        let config = EngineConfig::new("/w", "/d", "/s");
        let mut handle = connector.create(&config)?;
        assert_eq!(gateway.live_handles(), 1);
        handle.start()?;
        handle.destroy();
        assert_eq!(gateway.live_handles(), 0);
        assert_eq!(gateway.calls(), vec![GatewayCall::Start, GatewayCall::Destroy]);
        Ok(())
    }

    #[test]
    fn failing_connectors_report_engine_errors() -> anyhow::Result<()> {
        let config = EngineConfig::new("/w", "/d", "/s");
        let err = RecordingConnector::default()
            .failing_create()
            .create(&config)
            .err()
            .ok_or_else(|| anyhow::anyhow!("create should fail"))?;
        assert!(matches!(err, EngineError::CreateFailed { .. }));

        let mut handle = RecordingConnector::default()
            .failing_start(-2)
            .create(&config)?;
        assert!(matches!(
            handle.start(),
            Err(EngineError::StartFailed { code: -2 })
        ));
        Ok(())
    }

    #[test]
    fn rejected_items_are_not_tracked() {
        let mut gateway = RecordingGateway::new();
        gateway.reject_items(-1);
        assert!(gateway.add_item(Path::new("/w/a.torrent")).is_err());
        assert_eq!(gateway.status().item_count, 0);
        assert_eq!(gateway.overlaps(), 0);
    }
}
