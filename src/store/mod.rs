//! The shared state store seam.
//!
//! The coordination core treats persistence as an opaque get/set store:
//! durable, but not atomic across keys and not safe for unsynchronized
//! concurrent cross-process writers. All safety comes from the layers above
//! (TaskQueue + FileMutex). Values cross the seam as `serde_json::Value`;
//! [`Partition`](crate::partition::Partition) converts to and from the
//! caller's typed state.
//!
//! Two implementations ship with the crate: [`JsonFileStore`] (one JSON file
//! per key under the storage root, atomic writes) and [`MemoryStore`]
//! (process-local, for tests and in-memory consumers).

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use serde_json::Value;

/// Durable key→value persistence consumed by partitions.
///
/// Implementations must be safe to share between the caller and the
/// per-partition queue workers, but need not synchronize concurrent writers
/// across processes.
pub trait SharedStateStore: Send + Sync {
    /// Read the value for a key, or `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Durably write the value for a key.
    fn set(&self, key: &str, value: Value) -> Result<()>;
}
