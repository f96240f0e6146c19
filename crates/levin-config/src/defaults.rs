//! Default values mirroring the platform shells.

/// Default watch directory (item files awaiting registration).
pub const WATCH_DIR: &str = "~/.config/levin/torrents";
/// Default data directory (seeded payloads).
pub const DATA_DIR: &str = "~/.cache/levin/data";
/// Default state directory (engine-managed persisted state).
pub const STATE_DIR: &str = "~/.local/state/levin";
/// Default absolute free-space floor in GB.
pub const MIN_FREE_GB: f64 = 2.0;
/// Default free-space floor as a fraction of the filesystem.
pub const MIN_FREE_PERCENTAGE: f64 = 0.05;
/// Default storage cap in GB (`0` = unlimited).
pub const MAX_STORAGE_GB: f64 = 0.0;
/// Default manifest endpoint for bulk acquisition.
pub const MANIFEST_URL: &str = "https://annas-archive.li/dyn/generate_torrents?max_tb=1&format=url";
/// Default request timeout in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;
/// Default attempts per request.
pub const FETCH_MAX_ATTEMPTS: u32 = 3;
/// Default log level.
pub const LOG_LEVEL: &str = "info";
/// Config file name under the `levin` config directory.
pub const CONFIG_FILE: &str = "levin.toml";

/// User agent identifying this build.
#[must_use]
pub fn user_agent() -> String {
    format!("levin/{}", env!("CARGO_PKG_VERSION"))
}
