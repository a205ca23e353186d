//! Lock acquisition and stale-marker reclamation.

use super::guard::MutexGuard;
use super::metadata::HolderMetadata;
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{CrosslockError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Cross-process exclusive lock for one named critical section.
///
/// Cheap to construct; all shared state lives in the marker file. Several
/// `FileMutex` values over the same name (in the same or different
/// processes) contend for the same lock.
#[derive(Debug, Clone)]
pub struct FileMutex {
    name: String,
    path: PathBuf,
    retry_interval: Duration,
    retry_budget: u32,
    stale_after: Duration,
}

impl FileMutex {
    /// Create a mutex for a named critical section under the storage root.
    pub fn new(ctx: &StoreContext, name: &str, config: &Config) -> Self {
        Self {
            name: name.to_string(),
            path: ctx.lock_path(name),
            retry_interval: config.lock_retry_interval(),
            retry_budget: config.lock_retry_budget,
            stale_after: config.lock_stale_after(),
        }
    }

    /// The lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the lock, blocking up to the retry budget.
    ///
    /// Each failed attempt sleeps the retry interval and consumes one budget
    /// slot. Before sleeping, the existing marker's age is checked; a marker
    /// older than the staleness threshold is forcibly deleted (the previous
    /// holder is presumed crashed) and the attempt retries immediately
    /// without consuming a slot. Exhausting the budget fails with
    /// [`CrosslockError::LockTimeout`] and no state change.
    pub fn acquire(&self, action: &str) -> Result<MutexGuard> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(guard) = self.try_acquire(action)? {
                return Ok(guard);
            }

            if self.reclaim_if_stale() {
                continue;
            }

            attempts += 1;
            if attempts >= self.retry_budget {
                return Err(CrosslockError::LockTimeout(self.timeout_message(attempts)));
            }
            thread::sleep(self.retry_interval);
        }
    }

    /// Attempt a single non-blocking acquisition.
    ///
    /// Returns `Ok(None)` when the lock is currently held by someone else.
    pub fn try_acquire(&self, action: &str) -> Result<Option<MutexGuard>> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                CrosslockError::Lock(format!(
                    "failed to create locks directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CrosslockError::Lock(format!(
                    "failed to acquire lock '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let metadata = HolderMetadata::new(action);
        let json = metadata.to_json()?;
        file.write_all(json.as_bytes()).map_err(|e| {
            // Clean up the marker on write failure so the lock is not wedged
            let _ = fs::remove_file(&self.path);
            CrosslockError::Lock(format!("failed to write lock metadata: {}", e))
        })?;

        file.sync_all().map_err(|e| {
            let _ = fs::remove_file(&self.path);
            CrosslockError::Lock(format!("failed to sync lock marker: {}", e))
        })?;

        Ok(Some(MutexGuard::new(self.path.clone())))
    }

    /// Read the current holder's metadata, if the lock is held.
    pub fn holder(&self) -> Option<HolderMetadata> {
        if !self.path.exists() {
            return None;
        }
        HolderMetadata::from_file(&self.path).ok()
    }

    /// Reclaim the marker if it exceeds the staleness threshold.
    ///
    /// Returns true when the caller should retry immediately: the marker was
    /// removed, or it vanished while being inspected. The removal itself can
    /// race another reclaimer; losing that race is fine, the subsequent
    /// create_new attempt arbitrates.
    fn reclaim_if_stale(&self) -> bool {
        let stale = match HolderMetadata::from_file(&self.path) {
            Ok(metadata) => metadata.is_stale(self.stale_after),
            // Unreadable metadata (foreign or torn marker): fall back to the
            // file's modification time as the liveness signal.
            Err(_) => match marker_mtime_age(&self.path) {
                Some(age) => age > self.stale_after,
                None => return true,
            },
        };

        if !stale {
            return false;
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::warn!(
                    lock = %self.name,
                    path = %self.path.display(),
                    "reclaimed stale lock marker"
                );
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(
                    lock = %self.name,
                    error = %e,
                    "failed to reclaim stale lock marker"
                );
                false
            }
        }
    }

    fn timeout_message(&self, attempts: u32) -> String {
        match self.holder() {
            Some(meta) => format!(
                "lock '{}' still held after {} attempts (holder: {}, action: {}, age: {}s)",
                self.name,
                attempts,
                meta.holder,
                meta.action,
                meta.age().num_seconds()
            ),
            None => format!("lock '{}' still held after {} attempts", self.name, attempts),
        }
    }
}

/// Age of a marker by file modification time, for markers whose metadata
/// cannot be parsed. `None` when the file is gone or mtime is unavailable.
fn marker_mtime_age(path: &std::path::Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}
