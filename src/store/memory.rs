//! In-memory store for tests and in-process consumers.

use super::SharedStateStore;
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Process-local store backed by a hash map.
///
/// Clones share the same underlying map, so several partitions (or a
/// partition and a test assertion) can observe one another's writes the way
/// separate processes would through a file-backed store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: std::sync::Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_the_same_map() {
        let store = MemoryStore::new();
        let view = store.clone();

        store.set("difficulty", json!("brutal")).unwrap();
        assert_eq!(view.get("difficulty").unwrap().unwrap(), json!("brutal"));
    }

    #[test]
    fn missing_keys_are_none() {
        let store = MemoryStore::new();
        assert!(store.get("absent").unwrap().is_none());
    }
}
