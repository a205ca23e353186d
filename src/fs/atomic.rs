//! Atomic filesystem writes.
//!
//! Persisted partition state and the session marker are replaced with the
//! temp-file + fsync + rename pattern so a crash mid-write can never leave a
//! reader looking at a half-written value.
//!
//! Source and destination must be on the same filesystem for the rename to
//! be atomic. On crash, a sibling temp file (`.{filename}.tmp`) may remain;
//! the next successful write replaces it.

use crate::error::{CrosslockError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file.
///
/// Writes the content to a temporary file in the same directory, syncs it to
/// disk, then atomically renames it over the target. The target file is never
/// observable in a partial state.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            CrosslockError::Store(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;
    atomic_replace(&temp_path, path)?;

    Ok(())
}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Sibling temp path for the target: `.{filename}.tmp` in the same directory.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CrosslockError::Store("invalid file path".to_string()))?;
    Ok(parent.join(format!(".{}.tmp", filename)))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        CrosslockError::Store(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        CrosslockError::Store(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        CrosslockError::Store(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

/// Atomically replace the target with the source.
///
/// On POSIX, `rename()` replaces an existing destination atomically. The
/// parent directory is synced afterwards so the directory entry is durable.
#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        CrosslockError::Store(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Windows rename: retry after removing the destination, since `rename()`
/// does not replace an existing file there.
#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            let _ = fs::remove_file(target);
            fs::rename(source, target).map_err(|e| {
                let _ = fs::remove_file(source);
                CrosslockError::Store(format!(
                    "failed to atomically replace '{}': {}",
                    target.display(),
                    e
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("value.json");

        atomic_write(&file_path, b"{\"count\":1}").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "{\"count\":1}");
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("value.json");

        atomic_write(&file_path, b"old").unwrap();
        atomic_write(&file_path, b"new").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "new");
    }

    #[test]
    fn atomic_write_creates_missing_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("deep").join("value.json");

        atomic_write(&file_path, b"x").unwrap();
        assert!(file_path.exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file_behind() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("value.json");

        atomic_write(&file_path, b"x").unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn atomic_write_file_writes_strings() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("marker");

        atomic_write_file(&file_path, "holder-a").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "holder-a");
    }
}
