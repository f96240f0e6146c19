//! In-process engine used when no native library is linked.
//!
//! It implements the engine's lifecycle state machine and disk budget so the
//! daemon runs end to end, but performs no networking: rates and peers stay
//! at zero and every registered item is reported as a complete seed.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use levin_engine_core::{
    EngineConfig, EngineConnector, EngineError, EngineGateway, EngineResult, EngineState,
    ItemSnapshot, StatusSnapshot,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Bytes withheld from the budget to prevent download/delete thrashing.
pub const DISK_HYSTERESIS_BYTES: u64 = 50 * 1024 * 1024;

const ITEM_EXTENSION: &str = "torrent";
const START_REJECTED: i32 = -1;
const ITEM_REJECTED: i32 = -1;

/// Connector producing [`SimulatedEngine`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedConnector;

impl EngineConnector for SimulatedConnector {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create(&self, config: &EngineConfig) -> EngineResult<Box<dyn EngineGateway>> {
        Ok(Box::new(SimulatedEngine::new(config.clone())))
    }
}

/// Result of a disk budget evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskBudget {
    /// Bytes the engine may occupy.
    pub budget: u64,
    /// Whether the engine must stop growing.
    pub over_budget: bool,
}

/// Compute the disk budget from filesystem statistics and current usage.
///
/// The free-space floor is the larger of `min_free_bytes` and
/// `fs_total * min_free_percentage`. A non-zero `max_storage_bytes` caps the
/// budget further. [`DISK_HYSTERESIS_BYTES`] is always withheld.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn disk_budget(
    fs_total: u64,
    fs_free: u64,
    usage: u64,
    min_free_bytes: u64,
    min_free_percentage: f64,
    max_storage_bytes: u64,
) -> DiskBudget {
    let pct_bytes = (fs_total as f64 * min_free_percentage) as u64;
    let min_required = min_free_bytes.max(pct_bytes);
    let available = fs_free.saturating_sub(min_required);

    let (budget, over_budget) = if max_storage_bytes > 0 {
        let remaining = max_storage_bytes.saturating_sub(usage);
        let budget = available.min(remaining);
        (budget, usage > max_storage_bytes || budget == 0)
    } else {
        (available, available == 0)
    };

    if budget > DISK_HYSTERESIS_BYTES {
        DiskBudget {
            budget: budget - DISK_HYSTERESIS_BYTES,
            over_budget,
        }
    } else {
        DiskBudget {
            budget: 0,
            over_budget: true,
        }
    }
}

#[derive(Debug, Default)]
struct StateMachine {
    state: EngineState,
    enabled: bool,
    battery_ok: bool,
    network_ok: bool,
    has_items: bool,
    storage_ok: bool,
}

impl StateMachine {
    fn evaluate(&mut self) {
        let next = if !self.enabled {
            EngineState::Off
        } else if !self.battery_ok || !self.network_ok {
            EngineState::Paused
        } else if !self.has_items {
            EngineState::Idle
        } else if !self.storage_ok {
            EngineState::Seeding
        } else {
            EngineState::Downloading
        };
        if next != self.state {
            debug!(from = %self.state, to = %next, "simulated engine state evaluated");
            self.state = next;
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedItem {
    name: String,
    size: u64,
}

/// Engine stand-in that tracks policy inputs and registered items.
#[derive(Debug)]
pub struct SimulatedEngine {
    config: EngineConfig,
    started: bool,
    machine: StateMachine,
    on_ac_power: bool,
    has_wifi: bool,
    has_cellular: bool,
    fs_total: u64,
    fs_free: u64,
    disk_usage: u64,
    budget: DiskBudget,
    items: BTreeMap<String, SimulatedItem>,
    paths: BTreeMap<PathBuf, String>,
    tick_count: u64,
}

impl SimulatedEngine {
    /// Create an engine for the given configuration; nothing touches disk
    /// until [`EngineGateway::start`].
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            started: false,
            machine: StateMachine::default(),
            on_ac_power: false,
            has_wifi: false,
            has_cellular: false,
            fs_total: 0,
            fs_free: 0,
            disk_usage: 0,
            budget: DiskBudget {
                budget: 0,
                over_budget: false,
            },
            items: BTreeMap::new(),
            paths: BTreeMap::new(),
            tick_count: 0,
        }
    }

    fn refresh_battery(&mut self) {
        self.machine.battery_ok = self.on_ac_power || self.config.settings.run_on_battery;
        self.machine.evaluate();
    }

    fn refresh_network(&mut self) {
        self.machine.network_ok =
            self.has_wifi || (self.has_cellular && self.config.settings.run_on_cellular);
        self.machine.evaluate();
    }

    fn refresh_items(&mut self) {
        self.machine.has_items = !self.items.is_empty();
        self.machine.evaluate();
    }

    fn disk_check(&mut self) {
        if self.fs_total == 0 {
            return;
        }
        self.disk_usage = directory_size(&self.config.data_dir);
        let settings = &self.config.settings;
        self.budget = disk_budget(
            self.fs_total,
            self.fs_free,
            self.disk_usage,
            settings.min_free_bytes,
            settings.min_free_percentage,
            settings.max_storage_bytes,
        );
        self.machine.storage_ok = !self.budget.over_budget;
        self.machine.evaluate();
    }

    fn scan_watch_dir(&mut self) {
        let entries = match fs::read_dir(&self.config.watch_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(
                    path = %self.config.watch_dir.display(),
                    error = %err,
                    "watch directory unreadable"
                );
                return;
            }
        };
        let candidates = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|ext| ext.to_str()) == Some(ITEM_EXTENSION)
            })
            .filter(|path| !self.paths.contains_key(path))
            .collect::<Vec<_>>();
        for path in candidates {
            if let Err(err) = self.register(&path) {
                debug!(path = %path.display(), error = %err, "watch directory entry skipped");
            }
        }
    }

    fn register(&mut self, path: &Path) -> EngineResult<()> {
        let metadata = fs::metadata(path).map_err(|_| EngineError::ItemRejected {
            path: path.to_path_buf(),
            code: ITEM_REJECTED,
        })?;
        if !metadata.is_file() {
            return Err(EngineError::ItemRejected {
                path: path.to_path_buf(),
                code: ITEM_REJECTED,
            });
        }
        if self.paths.contains_key(path) {
            return Ok(());
        }
        let id = item_id(path);
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.items.insert(
            id.clone(),
            SimulatedItem {
                name,
                size: metadata.len(),
            },
        );
        self.paths.insert(path.to_path_buf(), id);
        self.refresh_items();
        Ok(())
    }
}

impl EngineGateway for SimulatedEngine {
    fn start(&mut self) -> EngineResult<()> {
        if self.started {
            return Err(EngineError::StartFailed {
                code: START_REJECTED,
            });
        }
        for dir in [
            &self.config.watch_dir,
            &self.config.data_dir,
            &self.config.state_dir,
        ] {
            if let Err(err) = fs::create_dir_all(dir) {
                warn!(path = %dir.display(), error = %err, "engine directory unavailable");
            }
        }
        self.started = true;
        self.scan_watch_dir();
        info!(items = self.items.len(), "simulated engine started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.started {
            self.started = false;
            info!("simulated engine stopped");
        }
    }

    fn tick(&mut self) {
        if !self.started {
            return;
        }
        self.tick_count += 1;
        self.refresh_items();
        let interval = u64::from(self.config.disk_check_interval_secs.max(1));
        if self.tick_count == 1 || self.tick_count.is_multiple_of(interval) {
            self.scan_watch_dir();
            self.disk_check();
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.machine.enabled = enabled;
        self.machine.evaluate();
    }

    fn update_battery(&mut self, on_ac_power: bool) {
        self.on_ac_power = on_ac_power;
        self.refresh_battery();
    }

    fn update_network(&mut self, has_wifi: bool, has_cellular: bool) {
        self.has_wifi = has_wifi;
        self.has_cellular = has_cellular;
        self.refresh_network();
    }

    fn update_storage(&mut self, fs_total: u64, fs_free: u64) {
        self.fs_total = fs_total;
        self.fs_free = fs_free;
        if self.started {
            self.disk_check();
        }
    }

    fn status(&mut self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.machine.state,
            item_count: u32::try_from(self.items.len()).unwrap_or(u32::MAX),
            peer_count: 0,
            download_rate: 0,
            upload_rate: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            disk_usage: self.disk_usage,
            disk_budget: self.budget.budget,
            over_budget: self.budget.over_budget,
        }
    }

    fn items(&mut self) -> Vec<ItemSnapshot> {
        self.items
            .iter()
            .map(|(id, item)| ItemSnapshot {
                id: id.clone(),
                name: item.name.clone(),
                size: item.size,
                downloaded: item.size,
                progress: 1.0,
                is_seed: true,
                ..ItemSnapshot::default()
            })
            .collect()
    }

    fn add_item(&mut self, path: &Path) -> EngineResult<()> {
        if !self.started {
            return Err(EngineError::ItemRejected {
                path: path.to_path_buf(),
                code: ITEM_REJECTED,
            });
        }
        self.register(path)
    }

    fn remove_item(&mut self, id: &str) {
        if self.items.remove(id).is_some() {
            self.paths.retain(|_, existing| existing != id);
            self.refresh_items();
        }
    }

    fn set_download_limit(&mut self, kbps: u32) {
        self.config.settings.download_limit_kbps = kbps;
    }

    fn set_upload_limit(&mut self, kbps: u32) {
        self.config.settings.upload_limit_kbps = kbps;
    }

    fn set_run_on_battery(&mut self, allowed: bool) {
        self.config.settings.run_on_battery = allowed;
        self.refresh_battery();
    }

    fn set_run_on_cellular(&mut self, allowed: bool) {
        self.config.settings.run_on_cellular = allowed;
        self.refresh_network();
    }

    fn set_disk_limits(
        &mut self,
        min_free_bytes: u64,
        min_free_percentage: f64,
        max_storage_bytes: u64,
    ) {
        self.config.settings.min_free_bytes = min_free_bytes;
        self.config.settings.min_free_percentage = min_free_percentage;
        self.config.settings.max_storage_bytes = max_storage_bytes;
        if self.started {
            self.disk_check();
        }
    }

    fn destroy(mut self: Box<Self>) {
        self.stop();
    }
}

fn item_id(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn directory_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
