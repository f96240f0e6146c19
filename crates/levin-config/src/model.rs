//! Typed configuration sections and conversions into engine inputs.

use std::path::PathBuf;
use std::time::Duration;

use levin_engine_core::{
    DEFAULT_DISK_CHECK_INTERVAL_SECS, DEFAULT_STUN_SERVER, EngineConfig, EngineSettings,
};
use serde::{Deserialize, Serialize};

use crate::defaults;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevinConfig {
    /// Directory layout.
    pub paths: PathsConfig,
    /// User-facing engine settings.
    pub settings: Settings,
    /// Bulk acquisition parameters.
    pub fetch: FetchConfig,
    /// Logging parameters.
    pub logging: LoggingSection,
}

impl LevinConfig {
    /// Creation-time configuration for the engine.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            watch_dir: self.paths.watch_dir.clone(),
            data_dir: self.paths.data_dir.clone(),
            state_dir: self.paths.state_dir.clone(),
            disk_check_interval_secs: self.settings.disk_check_interval_secs,
            stun_server: self.settings.stun_server.clone(),
            settings: self.settings.engine_settings(),
        }
    }
}

/// Directory layout. Values are stored expanded (`~` and `$VAR` resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Item files awaiting registration; the fetcher writes here.
    pub watch_dir: PathBuf,
    /// Seeded payload data; storage statistics are read for this path.
    pub data_dir: PathBuf,
    /// Engine-managed persisted state.
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(defaults::WATCH_DIR),
            data_dir: PathBuf::from(defaults::DATA_DIR),
            state_dir: PathBuf::from(defaults::STATE_DIR),
        }
    }
}

/// User-configurable engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Download cap in KiB/s (`0` = unlimited).
    pub download_limit_kbps: u32,
    /// Upload cap in KiB/s (`0` = unlimited).
    pub upload_limit_kbps: u32,
    /// Absolute free-space floor in GB.
    pub min_free_gb: f64,
    /// Free-space floor as a fraction of the filesystem.
    pub min_free_percentage: f64,
    /// Storage cap in GB (`0` = unlimited).
    pub max_storage_gb: f64,
    /// Keep running on battery power.
    pub run_on_battery: bool,
    /// Keep running on cellular-only connectivity.
    pub run_on_cellular: bool,
    /// Start the daemon at login. Consumed by the host's service manager.
    pub run_at_startup: bool,
    /// Interval between engine-side disk checks.
    pub disk_check_interval_secs: u32,
    /// STUN server used for NAT discovery.
    pub stun_server: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_limit_kbps: 0,
            upload_limit_kbps: 0,
            min_free_gb: defaults::MIN_FREE_GB,
            min_free_percentage: defaults::MIN_FREE_PERCENTAGE,
            max_storage_gb: defaults::MAX_STORAGE_GB,
            run_on_battery: false,
            run_on_cellular: false,
            run_at_startup: false,
            disk_check_interval_secs: DEFAULT_DISK_CHECK_INTERVAL_SECS,
            stun_server: DEFAULT_STUN_SERVER.to_string(),
        }
    }
}

impl Settings {
    /// Runtime settings in the units the engine expects.
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            download_limit_kbps: self.download_limit_kbps,
            upload_limit_kbps: self.upload_limit_kbps,
            run_on_battery: self.run_on_battery,
            run_on_cellular: self.run_on_cellular,
            min_free_bytes: gb_to_bytes(self.min_free_gb),
            min_free_percentage: self.min_free_percentage,
            max_storage_bytes: gb_to_bytes(self.max_storage_gb),
        }
    }
}

/// Bulk acquisition parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Endpoint returning the newline-delimited manifest.
    pub manifest_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Connect/read timeout per request, in seconds.
    pub timeout_secs: u64,
    /// Attempts per request before giving up.
    pub max_attempts: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            manifest_url: defaults::MANIFEST_URL.to_string(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::FETCH_TIMEOUT_SECS,
            max_attempts: defaults::FETCH_MAX_ATTEMPTS,
        }
    }
}

impl FetchConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Level used when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; inferred from the build when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn gb_to_bytes(gb: f64) -> u64 {
    if gb.is_finite() && gb > 0.0 {
        (gb * BYTES_PER_GB) as u64
    } else {
        0
    }
}
