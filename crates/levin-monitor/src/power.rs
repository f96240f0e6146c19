//! AC power detection from `/sys/class/power_supply`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use crate::observer::SignalSource;

/// Poll period for the power observer.
pub const POWER_POLL_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_ROOT: &str = "/sys/class/power_supply";
const SIGNAL: &str = "power";

/// Derived power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    /// Whether the host is running from mains power.
    pub on_ac_power: bool,
}

/// Power source backed by the Linux power-supply class.
///
/// A host without a power-supply tree, or without any `Mains` supply, is
/// treated as a desktop on AC power.
#[derive(Debug, Clone)]
pub struct SysfsPower {
    root: PathBuf,
}

impl Default for SysfsPower {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl SysfsPower {
    /// Read supplies under `root` instead of the system path.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SignalSource for SysfsPower {
    type Signal = PowerState;

    fn name(&self) -> &'static str {
        SIGNAL
    }

    fn read(&mut self) -> MonitorResult<PowerState> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(PowerState { on_ac_power: true });
            }
            Err(source) => return Err(io_error(&self.root, source)),
        };

        let mut found_mains = false;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.root, source))?;
            let supply = entry.path();
            if read_attr(&supply, "type").as_deref() != Some("Mains") {
                continue;
            }
            found_mains = true;
            if read_attr(&supply, "online").as_deref() == Some("1") {
                return Ok(PowerState { on_ac_power: true });
            }
        }
        Ok(PowerState {
            on_ac_power: !found_mains,
        })
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|value| value.trim().to_string())
}

fn io_error(path: &Path, source: io::Error) -> MonitorError {
    MonitorError::Io {
        signal: SIGNAL,
        path: path.to_path_buf(),
        source,
    }
}
