//! Engine gateway backed by the native `liblevin` library.

use std::ffi::{CStr, CString};
use std::os::raw::c_int;
use std::path::Path;
use std::ptr::NonNull;

use levin_engine_core::{
    EngineConfig, EngineConnector, EngineError, EngineGateway, EngineResult, EngineState,
    ItemSnapshot, StatusSnapshot,
};

use crate::ffi;

const CONNECTOR: &str = "liblevin";

/// Connector producing [`NativeEngine`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

impl EngineConnector for NativeConnector {
    fn name(&self) -> &'static str {
        CONNECTOR
    }

    fn create(&self, config: &EngineConfig) -> EngineResult<Box<dyn EngineGateway>> {
        let watch = path_cstring(&config.watch_dir, "watch_dir")?;
        let data = path_cstring(&config.data_dir, "data_dir")?;
        let state = path_cstring(&config.state_dir, "state_dir")?;
        let stun = CString::new(config.stun_server.as_str()).map_err(|_| {
            EngineError::InvalidConfig {
                field: "stun_server",
                reason: "contains an interior NUL byte",
            }
        })?;
        let settings = &config.settings;
        let raw = ffi::LevinConfig {
            watch_directory: watch.as_ptr(),
            data_directory: data.as_ptr(),
            state_directory: state.as_ptr(),
            min_free_bytes: settings.min_free_bytes,
            min_free_percentage: settings.min_free_percentage,
            max_storage_bytes: settings.max_storage_bytes,
            run_on_battery: c_int::from(settings.run_on_battery),
            run_on_cellular: c_int::from(settings.run_on_cellular),
            disk_check_interval_secs: to_c_int(config.disk_check_interval_secs),
            max_download_kbps: to_c_int(settings.download_limit_kbps),
            max_upload_kbps: to_c_int(settings.upload_limit_kbps),
            stun_server: stun.as_ptr(),
        };
        // SAFETY: every pointer in `raw` refers to a CString that outlives the call;
        // liblevin copies the strings into its own context.
        let ctx = unsafe { ffi::levin_create(&raw) };
        let ctx = NonNull::new(ctx).ok_or(EngineError::CreateFailed {
            connector: CONNECTOR,
        })?;
        Ok(Box::new(NativeEngine { ctx }))
    }
}

/// Live `liblevin` context.
pub struct NativeEngine {
    ctx: NonNull<ffi::LevinCtx>,
}

// SAFETY: the context is created on the worker task and moved into it exactly once;
// it is never shared or accessed concurrently from other threads.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    const fn raw(&self) -> *mut ffi::LevinCtx {
        self.ctx.as_ptr()
    }
}

impl EngineGateway for NativeEngine {
    fn start(&mut self) -> EngineResult<()> {
        // SAFETY: `ctx` is a live handle owned by this value.
        let code = unsafe { ffi::levin_start(self.raw()) };
        if code == 0 {
            Ok(())
        } else {
            Err(EngineError::StartFailed { code })
        }
    }

    fn stop(&mut self) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_stop(self.raw()) };
    }

    fn tick(&mut self) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_tick(self.raw()) };
    }

    fn set_enabled(&mut self, enabled: bool) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_set_enabled(self.raw(), c_int::from(enabled)) };
    }

    fn update_battery(&mut self, on_ac_power: bool) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_update_battery(self.raw(), c_int::from(on_ac_power)) };
    }

    fn update_network(&mut self, has_wifi: bool, has_cellular: bool) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe {
            ffi::levin_update_network(
                self.raw(),
                c_int::from(has_wifi),
                c_int::from(has_cellular),
            );
        }
    }

    fn update_storage(&mut self, fs_total: u64, fs_free: u64) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_update_storage(self.raw(), fs_total, fs_free) };
    }

    fn status(&mut self) -> StatusSnapshot {
        // SAFETY: `ctx` is a live handle owned by this value.
        let raw = unsafe { ffi::levin_get_status(self.raw()) };
        StatusSnapshot {
            state: state_from_c(raw.state),
            item_count: non_negative(raw.torrent_count),
            peer_count: non_negative(raw.peer_count),
            download_rate: u64::from(non_negative(raw.download_rate)),
            upload_rate: u64::from(non_negative(raw.upload_rate)),
            total_downloaded: raw.total_downloaded,
            total_uploaded: raw.total_uploaded,
            disk_usage: raw.disk_usage,
            disk_budget: raw.disk_budget,
            over_budget: raw.over_budget != 0,
        }
    }

    fn items(&mut self) -> Vec<ItemSnapshot> {
        let mut count: c_int = 0;
        // SAFETY: `ctx` is live and `count` is a valid out-pointer.
        let list = unsafe { ffi::levin_get_torrents(self.raw(), &mut count) };
        if list.is_null() || count <= 0 {
            return Vec::new();
        }
        let len = usize::try_from(count).unwrap_or(0);
        // SAFETY: liblevin returned `count` contiguous entries at `list`, valid
        // until `levin_free_torrents`.
        let entries = unsafe { std::slice::from_raw_parts(list, len) };
        let items = entries.iter().map(item_from_c).collect();
        // SAFETY: `list` and `count` are exactly what `levin_get_torrents` returned.
        unsafe { ffi::levin_free_torrents(list, count) };
        items
    }

    fn add_item(&mut self, path: &Path) -> EngineResult<()> {
        let rejected = |code| EngineError::ItemRejected {
            path: path.to_path_buf(),
            code,
        };
        let raw_path = path_cstring(path, "item_path").map_err(|_| rejected(-1))?;
        // SAFETY: `ctx` is live and `raw_path` outlives the call.
        let code = unsafe { ffi::levin_add_torrent(self.raw(), raw_path.as_ptr()) };
        if code == 0 { Ok(()) } else { Err(rejected(code)) }
    }

    fn remove_item(&mut self, id: &str) {
        let Ok(raw_id) = CString::new(id) else {
            return;
        };
        // SAFETY: `ctx` is live and `raw_id` outlives the call.
        unsafe { ffi::levin_remove_torrent(self.raw(), raw_id.as_ptr()) };
    }

    fn set_download_limit(&mut self, kbps: u32) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_set_download_limit(self.raw(), to_c_int(kbps)) };
    }

    fn set_upload_limit(&mut self, kbps: u32) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_set_upload_limit(self.raw(), to_c_int(kbps)) };
    }

    fn set_run_on_battery(&mut self, allowed: bool) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_set_run_on_battery(self.raw(), c_int::from(allowed)) };
    }

    fn set_run_on_cellular(&mut self, allowed: bool) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe { ffi::levin_set_run_on_cellular(self.raw(), c_int::from(allowed)) };
    }

    fn set_disk_limits(
        &mut self,
        min_free_bytes: u64,
        min_free_percentage: f64,
        max_storage_bytes: u64,
    ) {
        // SAFETY: `ctx` is a live handle owned by this value.
        unsafe {
            ffi::levin_set_disk_limits(
                self.raw(),
                min_free_bytes,
                min_free_percentage,
                max_storage_bytes,
            );
        }
    }

    fn destroy(self: Box<Self>) {
        // SAFETY: consuming the box guarantees the handle is released exactly once.
        unsafe { ffi::levin_destroy(self.raw()) };
    }
}

fn path_cstring(path: &Path, field: &'static str) -> EngineResult<CString> {
    CString::new(path.to_string_lossy().into_owned()).map_err(|_| EngineError::InvalidConfig {
        field,
        reason: "contains an interior NUL byte",
    })
}

fn to_c_int(value: u32) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

fn non_negative(value: c_int) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

const fn state_from_c(code: c_int) -> EngineState {
    match code {
        ffi::LEVIN_STATE_PAUSED => EngineState::Paused,
        ffi::LEVIN_STATE_IDLE => EngineState::Idle,
        ffi::LEVIN_STATE_SEEDING => EngineState::Seeding,
        ffi::LEVIN_STATE_DOWNLOADING => EngineState::Downloading,
        _ => EngineState::Off,
    }
}

fn item_from_c(raw: &ffi::LevinTorrent) -> ItemSnapshot {
    // SAFETY: `info_hash` is a NUL-terminated 41-byte buffer.
    let id = unsafe { CStr::from_ptr(raw.info_hash.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let name = if raw.name.is_null() {
        String::new()
    } else {
        // SAFETY: non-null names are NUL-terminated strings owned by the list.
        unsafe { CStr::from_ptr(raw.name) }
            .to_string_lossy()
            .into_owned()
    };
    ItemSnapshot {
        id,
        name,
        size: raw.size,
        downloaded: raw.downloaded,
        uploaded: raw.uploaded,
        download_rate: u64::from(non_negative(raw.download_rate)),
        upload_rate: u64::from(non_negative(raw.upload_rate)),
        peers: non_negative(raw.num_peers),
        progress: raw.progress,
        is_seed: raw.is_seed != 0,
    }
}
