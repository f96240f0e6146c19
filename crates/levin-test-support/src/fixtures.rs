//! Temporary directory layouts mirroring the daemon's watch/data/state split.

use std::path::{Path, PathBuf};

use anyhow::Result;
use levin_engine_core::EngineConfig;
use tempfile::TempDir;

/// Temporary root holding `watch/`, `data/` and `state/` directories.
///
/// Directories are created eagerly and removed when the layout is dropped.
pub struct TempLayout {
    root: TempDir,
}

impl TempLayout {
    /// Create a fresh layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        let root = TempDir::new()?;
        for name in ["watch", "data", "state"] {
            std::fs::create_dir_all(root.path().join(name))?;
        }
        Ok(Self { root })
    }

    /// Root of the layout.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Watch directory.
    #[must_use]
    pub fn watch_dir(&self) -> PathBuf {
        self.root.path().join("watch")
    }

    /// Data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    /// State directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    /// Engine configuration pointing at this layout.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.watch_dir(), self.data_dir(), self.state_dir())
    }

    /// Write an item file into the watch directory and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_item(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.watch_dir().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_creates_directories() -> Result<()> {
        let layout = TempLayout::new()?;
        assert!(layout.watch_dir().is_dir());
        assert!(layout.data_dir().is_dir());
        assert!(layout.state_dir().is_dir());
        let item = layout.write_item("a.torrent", b"x")?;
        assert!(item.is_file());
        assert_eq!(layout.engine_config().watch_dir, layout.watch_dir());
        Ok(())
    }
}
