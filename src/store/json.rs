//! File-backed store: one JSON document per key.

use super::SharedStateStore;
use crate::context::StoreContext;
use crate::error::{CrosslockError, Result};
use crate::fs::atomic_write;
use serde_json::Value;
use std::fs;

/// Store keeping each key as `<root>/state/<key>.json`.
///
/// Writes go through the atomic temp-file + rename path so a crashed writer
/// never leaves a partially serialized document for other processes to read.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    ctx: StoreContext,
}

impl JsonFileStore {
    /// Create a store over the given storage root, ensuring the layout exists.
    pub fn new(ctx: &StoreContext) -> Result<Self> {
        ctx.ensure_layout()?;
        Ok(Self { ctx: ctx.clone() })
    }
}

impl SharedStateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.ctx.state_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CrosslockError::Store(format!(
                    "failed to read state file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let value = serde_json::from_str(&content).map_err(|e| {
            CrosslockError::Store(format!(
                "failed to parse state file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.ctx.state_path(key);
        let json = serde_json::to_string_pretty(&value).map_err(|e| {
            CrosslockError::Store(format!("failed to serialize state for '{}': {}", key, e))
        })?;
        atomic_write(&path, json.as_bytes())
    }
}
