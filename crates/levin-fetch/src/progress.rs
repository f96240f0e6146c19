//! Per-item progress notifications.

use std::fmt;

pub use levin_events::FetchStep;

/// One advisory progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProgress {
    /// 1-based position of the item in the manifest.
    pub current: usize,
    /// Number of items in the manifest.
    pub total: usize,
    /// What happened to the item.
    pub step: FetchStep,
    /// Local file name of the item.
    pub name: String,
}

impl FetchProgress {
    /// Human-readable message, e.g. `downloaded: a.torrent`.
    #[must_use]
    pub fn message(&self) -> String {
        let verb = match self.step {
            FetchStep::Skipped => "skipped (exists)",
            FetchStep::Downloading => "downloading",
            FetchStep::Downloaded => "downloaded",
            FetchStep::Failed => "failed",
        };
        format!("{verb}: {}", self.name)
    }
}

impl fmt::Display for FetchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.current, self.total, self.message())
    }
}

/// Outcome of a completed (or cancelled) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Files newly written to the watch directory.
    pub downloaded: usize,
    /// Items whose file already existed.
    pub skipped: usize,
    /// Items whose every attempt failed.
    pub failed: usize,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
    /// Paths of the newly downloaded files, in manifest order.
    pub files: Vec<std::path::PathBuf>,
}
