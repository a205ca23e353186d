//! Session marker reads and writes.
//!
//! The session marker is a single shared file whose content is the plain
//! UTF-8 HolderId of the current leader. It persists for the life of the
//! storage root and is overwritten, never deleted, on each claim.

use crate::error::{CrosslockError, Result};
use crate::fs::atomic_write_file;
use crate::mutex::owner_string;
use std::fs;
use std::path::Path;

/// Compute a HolderId unique to this process instance.
///
/// Combines the owner identity, the pid, and a startup timestamp so two runs
/// of the same executable (or a recycled pid) never compare equal.
pub fn holder_id() -> String {
    format!(
        "{}#{}@{}",
        owner_string(),
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    )
}

/// Overwrite the session marker with the given holder id (last-writer-wins).
pub fn write_marker(path: &Path, holder_id: &str) -> Result<()> {
    atomic_write_file(path, holder_id).map_err(|e| {
        CrosslockError::LeadershipIndeterminate(format!(
            "failed to write session marker '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Read the current leader's holder id from the session marker.
///
/// `Ok(None)` when the marker does not exist yet or is empty.
pub fn read_marker(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let holder = content.trim();
            if holder.is_empty() {
                Ok(None)
            } else {
                Ok(Some(holder.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CrosslockError::LeadershipIndeterminate(format!(
            "failed to read session marker '{}': {}",
            path.display(),
            e
        ))),
    }
}
