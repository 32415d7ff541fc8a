//! On-disk layout of a Flawless repository.
//!
//! ```text
//! <root>/
//!   .flawless/
//!     config.toml
//!     tracker
//!     depot/<hex>.depot
//!     depot/<hex>.map
//!     commit/<id>.rec
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Name of the root marker directory.
pub const MARKER_DIR: &str = ".flawless";

/// Paths of one repository on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryLayout {
    root: PathBuf,
}

impl RepositoryLayout {
    /// Layout for a working directory at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the nearest enclosing repository, starting at `start`.
    pub fn discover(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(MARKER_DIR).is_dir())
            .map(Self::new)
    }

    /// The working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    pub fn depot_dir(&self) -> PathBuf {
        self.marker_dir().join("depot")
    }

    pub fn commit_dir(&self) -> PathBuf {
        self.marker_dir().join("commit")
    }

    pub fn tracker_file(&self) -> PathBuf {
        self.marker_dir().join("tracker")
    }

    pub fn config_file(&self) -> PathBuf {
        self.marker_dir().join("config.toml")
    }

    pub fn is_initialized(&self) -> bool {
        self.marker_dir().is_dir()
    }

    /// Create the marker directory and its subdirectories.
    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.depot_dir())?;
        std::fs::create_dir_all(self.commit_dir())?;
        Ok(())
    }
}
