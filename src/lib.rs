//! Multi-process shared-state coordination over a filesystem storage root.
//!
//! Several processes (typically windows of the same application) share one
//! storage directory and coordinate through it alone, with no central broker:
//!
//! - [`mutex::FileMutex`] provides cross-process mutual exclusion through
//!   exclusively-created lock marker files, with bounded retry and stale
//!   reclaim.
//! - [`queue::TaskQueue`] serializes closures on a named worker, optionally
//!   holding a [`mutex::FileMutex`] for the duration of each task.
//! - [`partition::Partition`] is a named slice of shared state with cached
//!   reads and read-modify-write transactions that re-read the persisted
//!   value inside the critical section.
//! - [`leadership::SessionLeadership`] arbitrates which process is the
//!   authoritative live writer through a shared session marker, reloading
//!   registered partitions on every hand-off.
//!
//! All coordination state lives under a single root directory resolved by
//! [`context::StoreContext`]; persisted values go through implementations of
//! [`store::SharedStateStore`].

pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod leadership;
pub mod mutex;
pub mod partition;
pub mod queue;
pub mod store;

pub use config::Config;
pub use context::StoreContext;
pub use error::{CrosslockError, Result};
pub use leadership::{LeaderState, SessionLeadership};
pub use mutex::{FileMutex, MutexGuard};
pub use partition::{Partition, Reloadable};
pub use queue::{TaskHandle, TaskQueue};
pub use store::{JsonFileStore, MemoryStore, SharedStateStore};
