//! Configuration model for crosslock.
//!
//! Defines the Config struct that represents `<storage root>/crosslock.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//!
//! Every tunable has a default matching the documented coordination behavior:
//! 100ms lock retries with a ~5s ceiling, a 10s lock staleness threshold,
//! 100ms watch debounce, and a 2s leadership safety poll.

use crate::error::{CrosslockError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a crosslock storage root.
///
/// All intervals are in milliseconds so tests can shrink them uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interval between lock acquisition attempts.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,

    /// Maximum number of backoff slots consumed before `acquire` fails
    /// with a timeout. Stale-marker reclamations do not consume a slot.
    #[serde(default = "default_lock_retry_budget")]
    pub lock_retry_budget: u32,

    /// Age beyond which a held lock marker is presumed abandoned and is
    /// forcibly reclaimed.
    #[serde(default = "default_lock_stale_ms")]
    pub lock_stale_ms: u64,

    /// Quiet window applied to filesystem change notifications for the
    /// session marker before a resync runs.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Interval of the periodic leadership safety poll, covering missed or
    /// coalesced filesystem events.
    #[serde(default = "default_leadership_poll_ms")]
    pub leadership_poll_ms: u64,
}

fn default_lock_retry_interval_ms() -> u64 {
    100
}

fn default_lock_retry_budget() -> u32 {
    50
}

fn default_lock_stale_ms() -> u64 {
    10_000
}

fn default_watch_debounce_ms() -> u64 {
    100
}

fn default_leadership_poll_ms() -> u64 {
    2_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            lock_retry_budget: default_lock_retry_budget(),
            lock_stale_ms: default_lock_stale_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            leadership_poll_ms: default_leadership_poll_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Unknown fields are ignored for forward compatibility. The loaded
    /// config is validated before being returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CrosslockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            CrosslockError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A present-but-invalid file is still an error; silently ignoring a
    /// malformed config would hide misconfigured staleness thresholds.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.lock_retry_interval_ms == 0 {
            return Err(CrosslockError::Config(
                "lock_retry_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.lock_retry_budget == 0 {
            return Err(CrosslockError::Config(
                "lock_retry_budget must be greater than 0".to_string(),
            ));
        }
        if self.lock_stale_ms <= self.lock_retry_interval_ms {
            return Err(CrosslockError::Config(format!(
                "lock_stale_ms ({}) must exceed lock_retry_interval_ms ({})",
                self.lock_stale_ms, self.lock_retry_interval_ms
            )));
        }
        if self.leadership_poll_ms == 0 {
            return Err(CrosslockError::Config(
                "leadership_poll_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between lock acquisition attempts.
    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    /// Lock marker staleness threshold.
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_millis(self.lock_stale_ms)
    }

    /// Debounce window for session marker change notifications.
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Leadership safety-poll interval.
    pub fn leadership_poll(&self) -> Duration {
        Duration::from_millis(self.leadership_poll_ms)
    }
}
