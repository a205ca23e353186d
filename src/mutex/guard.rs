//! RAII lock guard implementation.

use crate::error::{CrosslockError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// RAII guard for a held file mutex.
///
/// When dropped, the marker file is deleted. Release is idempotent: a marker
/// already removed (e.g., reclaimed as stale by another process) is not an
/// error. If deletion fails for another reason during drop, a warning is
/// logged but no panic occurs.
#[derive(Debug)]
pub struct MutexGuard {
    /// Path to the marker file.
    path: PathBuf,

    /// Whether the lock has been released manually.
    released: bool,
}

impl MutexGuard {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Get the path to the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manually release the lock, handling errors explicitly.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CrosslockError::Lock(format!(
                "failed to release lock '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release lock marker on drop"
            );
        }
    }
}
