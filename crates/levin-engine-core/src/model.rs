//! Configuration, runtime settings and status DTOs exchanged with the engine.

use std::path::PathBuf;

use levin_events::EngineState;
use serde::{Deserialize, Serialize};

/// Default fraction of the filesystem kept free.
pub const DEFAULT_MIN_FREE_PERCENTAGE: f64 = 0.05;
/// Default interval between engine-side disk checks.
pub const DEFAULT_DISK_CHECK_INTERVAL_SECS: u32 = 60;
/// Default STUN server used for NAT discovery.
pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

/// Creation-time configuration handed to [`crate::EngineConnector::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory scanned for new item files.
    pub watch_dir: PathBuf,
    /// Directory holding seeded payload data.
    pub data_dir: PathBuf,
    /// Directory holding engine-managed persisted state.
    pub state_dir: PathBuf,
    /// Interval between engine-side disk checks.
    pub disk_check_interval_secs: u32,
    /// STUN server used for NAT discovery.
    pub stun_server: String,
    /// Runtime settings applied at creation.
    pub settings: EngineSettings,
}

impl EngineConfig {
    /// Build a configuration for the given directories with default settings.
    #[must_use]
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            data_dir: data_dir.into(),
            state_dir: state_dir.into(),
            disk_check_interval_secs: DEFAULT_DISK_CHECK_INTERVAL_SECS,
            stun_server: DEFAULT_STUN_SERVER.to_string(),
            settings: EngineSettings::default(),
        }
    }
}

/// Settings the engine accepts while running.
///
/// Bandwidth caps are in KiB/s with `0` meaning unlimited; `max_storage_bytes`
/// of `0` also means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Download cap in KiB/s.
    pub download_limit_kbps: u32,
    /// Upload cap in KiB/s.
    pub upload_limit_kbps: u32,
    /// Keep running while on battery power.
    pub run_on_battery: bool,
    /// Keep running on cellular-only connectivity.
    pub run_on_cellular: bool,
    /// Absolute free-space floor in bytes.
    pub min_free_bytes: u64,
    /// Free-space floor as a fraction of the filesystem size.
    pub min_free_percentage: f64,
    /// Upper bound on engine disk usage in bytes.
    pub max_storage_bytes: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            download_limit_kbps: 0,
            upload_limit_kbps: 0,
            run_on_battery: false,
            run_on_cellular: false,
            min_free_bytes: 0,
            min_free_percentage: DEFAULT_MIN_FREE_PERCENTAGE,
            max_storage_bytes: 0,
        }
    }
}

impl EngineSettings {
    /// Short human-readable summary used in logs and events.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "down={} up={} battery={} cellular={} min_free={}B max_storage={}B",
            limit_label(self.download_limit_kbps),
            limit_label(self.upload_limit_kbps),
            self.run_on_battery,
            self.run_on_cellular,
            self.min_free_bytes,
            self.max_storage_bytes,
        )
    }
}

fn limit_label(kbps: u32) -> String {
    if kbps == 0 {
        "unlimited".to_string()
    } else {
        format!("{kbps}KiB/s")
    }
}

/// Immutable per-tick summary of engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Lifecycle state.
    pub state: EngineState,
    /// Items registered with the engine.
    pub item_count: u32,
    /// Connected peers across all items.
    pub peer_count: u32,
    /// Instantaneous download rate in bytes/s.
    pub download_rate: u64,
    /// Instantaneous upload rate in bytes/s.
    pub upload_rate: u64,
    /// Cumulative bytes downloaded.
    pub total_downloaded: u64,
    /// Cumulative bytes uploaded.
    pub total_uploaded: u64,
    /// Bytes the engine currently occupies on disk.
    pub disk_usage: u64,
    /// Bytes the engine may occupy on disk.
    pub disk_budget: u64,
    /// Whether usage exceeds the budget.
    pub over_budget: bool,
}

/// Per-item detail reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Hex info hash identifying the item.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Bytes downloaded.
    pub downloaded: u64,
    /// Bytes uploaded.
    pub uploaded: u64,
    /// Download rate in bytes/s.
    pub download_rate: u64,
    /// Upload rate in bytes/s.
    pub upload_rate: u64,
    /// Connected peers.
    pub peers: u32,
    /// Completion between `0.0` and `1.0`.
    pub progress: f64,
    /// Whether the payload is complete.
    pub is_seed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_unlimited() {
        let settings = EngineSettings::default();
        assert_eq!(settings.download_limit_kbps, 0);
        assert_eq!(settings.max_storage_bytes, 0);
        assert!((settings.min_free_percentage - 0.05).abs() < f64::EPSILON);
        assert!(settings.describe().starts_with("down=unlimited up=unlimited"));
    }

    #[test]
    fn capped_settings_describe_limits() {
        let settings = EngineSettings {
            download_limit_kbps: 512,
            ..EngineSettings::default()
        };
        assert!(settings.describe().contains("down=512KiB/s"));
    }

    #[test]
    fn status_snapshot_serializes_state_name() {
        let snapshot = StatusSnapshot {
            state: EngineState::Seeding,
            peer_count: 4,
            ..StatusSnapshot::default()
        };
        let value = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(value["state"], "seeding");
        assert_eq!(value["peer_count"], 4);
    }

    #[test]
    fn config_uses_engine_defaults() {
        let config = EngineConfig::new("/w", "/d", "/s");
        assert_eq!(config.disk_check_interval_secs, 60);
        assert_eq!(config.stun_server, DEFAULT_STUN_SERVER);
    }
}
