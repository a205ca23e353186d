//! Lock marker metadata structures and utilities.

use crate::error::{CrosslockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Metadata stored inside a lock marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderMetadata {
    /// Holder of the lock (e.g., `user@HOST`).
    pub holder: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was created (RFC3339).
    pub created_at: DateTime<Utc>,

    /// The operation being performed under the lock (e.g., `transaction`).
    pub action: String,
}

impl HolderMetadata {
    /// Create new marker metadata with the current timestamp.
    pub fn new(action: &str) -> Self {
        Self {
            holder: owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            action: action.to_string(),
        }
    }

    /// Parse marker metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CrosslockError::Lock(format!(
                "failed to read lock marker '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            CrosslockError::Lock(format!(
                "failed to parse lock marker '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize marker metadata to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CrosslockError::Lock(format!("failed to serialize lock metadata: {}", e))
        })
    }

    /// Age of the marker according to its embedded timestamp.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Check whether the marker exceeds the staleness threshold.
    ///
    /// A negative age (clock skew between writers) is never stale.
    pub fn is_stale(&self, threshold: std::time::Duration) -> bool {
        self.age().num_milliseconds() > threshold.as_millis() as i64
    }
}

/// Identity string for the current process: `user@HOST`.
pub(crate) fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
