//! Filesystem capacity for the data directory, read through `sysinfo`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::Disks;

use crate::error::{MonitorError, MonitorResult};
use crate::observer::SignalSource;

/// Poll period for the storage observer.
pub const STORAGE_POLL_INTERVAL: Duration = Duration::from_secs(30);

const SIGNAL: &str = "storage";

/// Capacity of the filesystem holding the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageState {
    /// Filesystem size in bytes.
    pub fs_total: u64,
    /// Bytes available to unprivileged writers.
    pub fs_free: u64,
}

/// Storage source for one directory.
#[derive(Debug)]
pub struct DiskStorage {
    path: PathBuf,
    disks: Disks,
}

impl DiskStorage {
    /// Report capacity for the filesystem containing `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            disks: Disks::new(),
        }
    }
}

impl SignalSource for DiskStorage {
    type Signal = StorageState;

    fn name(&self) -> &'static str {
        SIGNAL
    }

    fn read(&mut self) -> MonitorResult<StorageState> {
        self.disks.refresh_list();
        let target = resolve(&self.path);
        let mounts = self
            .disks
            .list()
            .iter()
            .map(|disk| MountInfo {
                mount_point: disk.mount_point(),
                total: disk.total_space(),
                available: disk.available_space(),
            })
            .collect::<Vec<_>>();
        select_mount(&target, &mounts).ok_or_else(|| MonitorError::Unavailable {
            signal: SIGNAL,
            detail: format!("no mounted filesystem contains {}", target.display()),
        })
    }
}

struct MountInfo<'a> {
    mount_point: &'a Path,
    total: u64,
    available: u64,
}

/// Canonical form of `path`, or of its nearest existing ancestor.
fn resolve(path: &Path) -> PathBuf {
    path.ancestors()
        .find_map(|candidate| candidate.canonicalize().ok())
        .unwrap_or_else(|| path.to_path_buf())
}

fn select_mount(target: &Path, mounts: &[MountInfo<'_>]) -> Option<StorageState> {
    mounts
        .iter()
        .filter(|mount| target.starts_with(mount.mount_point))
        .max_by_key(|mount| mount.mount_point.components().count())
        .map(|mount| StorageState {
            fs_total: mount.total,
            fs_free: mount.available,
        })
}
