//! Connectivity classification from `/sys/class/net`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use crate::observer::SignalSource;

/// Poll period for the network observer.
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_ROOT: &str = "/sys/class/net";
const SIGNAL: &str = "network";

/// Derived connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    /// An unmetered link is up. Ethernet and unknown links count as Wi-Fi.
    pub has_wifi: bool,
    /// A cellular (`wwan*`) link is up.
    pub has_cellular: bool,
}

/// Network source backed by the Linux net class.
#[derive(Debug, Clone)]
pub struct SysfsNetwork {
    root: PathBuf,
}

impl Default for SysfsNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl SysfsNetwork {
    /// Read interfaces under `root` instead of the system path.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SignalSource for SysfsNetwork {
    type Signal = NetworkState;

    fn name(&self) -> &'static str {
        SIGNAL
    }

    fn read(&mut self) -> MonitorResult<NetworkState> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(NetworkState {
                    has_wifi: true,
                    has_cellular: false,
                });
            }
            Err(source) => return Err(io_error(&self.root, source)),
        };

        let mut state = NetworkState {
            has_wifi: false,
            has_cellular: false,
        };
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let iface = entry.path();
            if name == "lo" || !is_up(&iface) {
                continue;
            }
            if name.starts_with("wwan") {
                state.has_cellular = true;
            } else {
                state.has_wifi = true;
            }
        }
        Ok(state)
    }
}

fn is_up(iface: &Path) -> bool {
    fs::read_to_string(iface.join("operstate"))
        .map(|state| state.trim() == "up")
        .unwrap_or(false)
}

fn io_error(path: &Path, source: io::Error) -> MonitorError {
    MonitorError::Io {
        signal: SIGNAL,
        path: path.to_path_buf(),
        source,
    }
}
