//! Named, independently-lockable slices of shared state.
//!
//! A [`Partition<T>`] pairs one storage key with an in-memory cache and a
//! mutex-backed [`TaskQueue`](crate::queue::TaskQueue). Reads are cheap and
//! may be stale; mutation goes through [`transaction`](Partition::transaction),
//! which inside the critical section re-reads the persisted value (never the
//! cache), applies the modifier, writes back, and only then refreshes the
//! cache. Callers needing a guaranteed-fresh value must use a transaction.
//!
//! Partitions are constructed once at process startup with explicit
//! dependencies and passed by reference to consumers; there are no ambient
//! singletons. Transactions on different partitions are fully independent
//! and proceed concurrently.

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{CrosslockError, Result};
use crate::mutex::FileMutex;
use crate::queue::{TaskHandle, TaskQueue};
use crate::store::SharedStateStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};

/// A cache that can be resynchronized from the persisted store.
///
/// Session leadership holds these handles and calls [`reload`](Self::reload)
/// on every registered partition when this process becomes the leader.
pub trait Reloadable: Send + Sync {
    /// The partition name, for logging.
    fn partition_name(&self) -> &str;

    /// Re-read the persisted value and overwrite the cache.
    fn reload(&self) -> Result<()>;
}

/// One named slice of shared state with cached reads and transactional
/// mutation.
///
/// The partition name doubles as its storage key and as the name of the
/// cross-process lock guarding its transactions.
pub struct Partition<T> {
    inner: Arc<PartitionInner<T>>,
    queue: TaskQueue,
}

struct PartitionInner<T> {
    name: String,
    default: T,
    store: Arc<dyn SharedStateStore>,
    cache: Mutex<T>,
}

impl<T> Partition<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Construct a partition over the given store.
    ///
    /// The cache is primed from the persisted value (or `default` when the
    /// key was never written), so `read()` is meaningful immediately.
    pub fn new(
        ctx: &StoreContext,
        config: &Config,
        name: &str,
        store: Arc<dyn SharedStateStore>,
        default: T,
    ) -> Result<Self> {
        let initial = match store.get(name)? {
            Some(value) => deserialize_state(name, value)?,
            None => default.clone(),
        };

        let inner = Arc::new(PartitionInner {
            name: name.to_string(),
            default,
            store,
            cache: Mutex::new(initial),
        });

        let queue = TaskQueue::with_mutex(name, FileMutex::new(ctx, name, config))?;

        Ok(Self { inner, queue })
    }

    /// The partition name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Return the cached value.
    ///
    /// May be stale relative to concurrent writers in other processes; the
    /// cache is advisory and is never the basis for a write.
    pub fn read(&self) -> T {
        self.inner.lock_cache().clone()
    }

    /// Enqueue a read-modify-write transaction.
    ///
    /// Inside the partition's critical section (FIFO within this process,
    /// lock-ordered across processes), the current persisted value is
    /// re-read, `modifier` is applied, and on success the new value is
    /// written back and the cache refreshed. The handle resolves with
    /// whatever `modifier` returned.
    ///
    /// If `modifier` errs or panics, no write occurs and the cache is left
    /// exactly as it was before the attempt.
    pub fn transaction<R, F>(&self, modifier: F) -> TaskHandle<R>
    where
        F: FnOnce(&mut T) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.queue.execute(move || inner.commit(modifier))
    }

    /// Re-read the persisted value and overwrite the cache, without a
    /// modifier.
    ///
    /// Idempotent with no intervening writes. Used after this process
    /// regains leadership, since writes by the previous leader may have been
    /// missed.
    pub fn reload(&self) -> Result<()> {
        self.inner.reload()
    }

    /// A reload handle for registration with session leadership.
    pub fn reloader(&self) -> Arc<dyn Reloadable> {
        Arc::clone(&self.inner) as Arc<dyn Reloadable>
    }
}

impl<T> PartitionInner<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Read the current persisted value, falling back to the default.
    fn load_persisted(&self) -> Result<T> {
        match self.store.get(&self.name)? {
            Some(value) => deserialize_state(&self.name, value),
            None => Ok(self.default.clone()),
        }
    }

    fn commit<R>(&self, modifier: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        // (a) re-read from the store, never from the cache
        let mut value = self.load_persisted()?;

        // (b) apply the modifier; an error aborts before any write
        let outcome = modifier(&mut value)?;

        // (c) persist, (d) only then overwrite the cache
        let json = serde_json::to_value(&value).map_err(|e| {
            CrosslockError::Transaction(format!(
                "failed to serialize new state for partition '{}': {}",
                self.name, e
            ))
        })?;
        self.store.set(&self.name, json)?;
        *self.lock_cache() = value;

        Ok(outcome)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, T> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Reloadable for PartitionInner<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn partition_name(&self) -> &str {
        &self.name
    }

    fn reload(&self) -> Result<()> {
        let value = self.load_persisted()?;
        *self.lock_cache() = value;
        Ok(())
    }
}

fn deserialize_state<T: DeserializeOwned>(name: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        CrosslockError::Store(format!(
            "failed to deserialize state for partition '{}': {}",
            name, e
        ))
    })
}
