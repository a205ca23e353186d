//! Storage root resolution for crosslock.
//!
//! This module provides the path layer that locates everything the
//! coordination core shares between processes: the lock marker directory,
//! the per-key state directory, the session leadership marker, and the
//! optional config file.
//!
//! All components take a `StoreContext` by reference at construction time;
//! there is no ambient global lookup. Every process that should coordinate
//! must resolve its context from the same storage root.

use crate::error::{CrosslockError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the storage root holding lock marker files.
pub const LOCKS_DIR: &str = "locks";

/// Directory under the storage root holding per-key state files.
pub const STATE_DIR: &str = "state";

/// Filename of the session leadership marker.
pub const SESSION_MARKER_FILE: &str = "session.leader";

/// Filename of the optional config file.
pub const CONFIG_FILE: &str = "crosslock.yaml";

/// Resolved paths for one shared storage root.
///
/// All paths are derived from the root; the struct is cheap to clone and
/// carries no open handles.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// The shared storage root all coordinating processes point at.
    pub root: PathBuf,

    /// Directory holding per-partition lock marker files.
    pub locks_dir: PathBuf,

    /// Directory holding per-key persisted state files.
    pub state_dir: PathBuf,
}

impl StoreContext {
    /// Resolve a context from a storage root path.
    ///
    /// Does not touch the filesystem; call [`ensure_layout`](Self::ensure_layout)
    /// before first use to create the shared directories.
    pub fn resolve<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let locks_dir = root.join(LOCKS_DIR);
        let state_dir = root.join(STATE_DIR);
        Self {
            root,
            locks_dir,
            state_dir,
        }
    }

    /// Create the storage layout if it does not exist yet.
    ///
    /// Safe to call from every process at startup; directory creation is
    /// idempotent and tolerant of concurrent creators.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [&self.root, &self.locks_dir, &self.state_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                CrosslockError::Store(format!(
                    "failed to create storage directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Path to the lock marker file for a named critical section.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", name))
    }

    /// Path to the session leadership marker.
    pub fn session_marker_path(&self) -> PathBuf {
        self.root.join(SESSION_MARKER_FILE)
    }

    /// Path to the persisted state file for a storage key.
    pub fn state_path(&self, key: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", key))
    }

    /// Path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}
