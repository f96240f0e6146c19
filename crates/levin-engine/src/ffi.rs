//! Raw bindings to the `liblevin` C API.

use std::os::raw::{c_char, c_double, c_int};

/// Lifecycle state codes reported by `levin_get_status`.
pub const LEVIN_STATE_OFF: c_int = 0;
/// Enabled but blocked by power or network policy.
pub const LEVIN_STATE_PAUSED: c_int = 1;
/// Running with nothing to seed.
pub const LEVIN_STATE_IDLE: c_int = 2;
/// Seeding only.
pub const LEVIN_STATE_SEEDING: c_int = 3;
/// Seeding and downloading.
pub const LEVIN_STATE_DOWNLOADING: c_int = 4;

/// Opaque engine context.
#[repr(C)]
pub struct LevinCtx {
    _private: [u8; 0],
}

/// Mirror of `levin_config_t`.
#[repr(C)]
pub struct LevinConfig {
    pub watch_directory: *const c_char,
    pub data_directory: *const c_char,
    pub state_directory: *const c_char,
    pub min_free_bytes: u64,
    pub min_free_percentage: c_double,
    pub max_storage_bytes: u64,
    pub run_on_battery: c_int,
    pub run_on_cellular: c_int,
    pub disk_check_interval_secs: c_int,
    pub max_download_kbps: c_int,
    pub max_upload_kbps: c_int,
    pub stun_server: *const c_char,
}

/// Mirror of `levin_status_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LevinStatus {
    pub state: c_int,
    pub torrent_count: c_int,
    pub peer_count: c_int,
    pub download_rate: c_int,
    pub upload_rate: c_int,
    pub total_downloaded: u64,
    pub total_uploaded: u64,
    pub disk_usage: u64,
    pub disk_budget: u64,
    pub over_budget: c_int,
}

/// Mirror of `levin_torrent_t`.
#[repr(C)]
pub struct LevinTorrent {
    pub info_hash: [c_char; 41],
    pub name: *const c_char,
    pub size: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub download_rate: c_int,
    pub upload_rate: c_int,
    pub num_peers: c_int,
    pub progress: c_double,
    pub is_seed: c_int,
}

unsafe extern "C" {
    pub fn levin_create(config: *const LevinConfig) -> *mut LevinCtx;
    pub fn levin_destroy(ctx: *mut LevinCtx);
    pub fn levin_start(ctx: *mut LevinCtx) -> c_int;
    pub fn levin_stop(ctx: *mut LevinCtx);
    pub fn levin_tick(ctx: *mut LevinCtx);

    pub fn levin_update_battery(ctx: *mut LevinCtx, on_ac_power: c_int);
    pub fn levin_update_network(ctx: *mut LevinCtx, has_wifi: c_int, has_cellular: c_int);
    pub fn levin_update_storage(ctx: *mut LevinCtx, fs_total: u64, fs_free: u64);

    pub fn levin_add_torrent(ctx: *mut LevinCtx, torrent_path: *const c_char) -> c_int;
    pub fn levin_remove_torrent(ctx: *mut LevinCtx, info_hash: *const c_char);

    pub fn levin_get_status(ctx: *mut LevinCtx) -> LevinStatus;
    pub fn levin_get_torrents(ctx: *mut LevinCtx, count: *mut c_int) -> *mut LevinTorrent;
    pub fn levin_free_torrents(list: *mut LevinTorrent, count: c_int);

    pub fn levin_set_enabled(ctx: *mut LevinCtx, enabled: c_int);
    pub fn levin_set_download_limit(ctx: *mut LevinCtx, kbps: c_int);
    pub fn levin_set_upload_limit(ctx: *mut LevinCtx, kbps: c_int);
    pub fn levin_set_run_on_battery(ctx: *mut LevinCtx, run_on_battery: c_int);
    pub fn levin_set_run_on_cellular(ctx: *mut LevinCtx, run_on_cellular: c_int);
    pub fn levin_set_disk_limits(
        ctx: *mut LevinCtx,
        min_free_bytes: u64,
        min_free_percentage: c_double,
        max_storage_bytes: u64,
    );
}
