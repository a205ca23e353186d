//! Multi-process session leadership arbitration.
//!
//! When several processes share one storage root, exactly one should be the
//! authoritative live writer at a time: the window the user is actively using
//! should own the shared state. Leadership is arbitrated through a single
//! shared session marker file whose content is the current leader's HolderId.
//!
//! Claims are last-writer-wins overwrites with no compare-and-swap or fencing
//! token: two processes racing to claim within the same debounce/poll window
//! can transiently both believe they are leader until the next resync. That
//! eventual-consistency window is accepted behavior, bounded by
//! `max(debounce, poll interval)`.
//!
//! Every transition *into* `LockedByMe` synchronously reloads all registered
//! partitions, because while not leader this process may have missed writes
//! made by the previous leader. Subscribers are notified only on actual state
//! transitions, never on every poll tick.

mod marker;
mod watcher;

#[cfg(test)]
mod tests;

pub use marker::holder_id;

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::Result;
use crate::partition::Reloadable;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use watcher::WatcherHandle;

/// This process's view of who owns the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    /// The marker is missing or unreadable; assume not leader.
    Unknown,
    /// The marker carries our HolderId; this process is the live writer.
    LockedByMe,
    /// Another process's HolderId is in the marker.
    LockedByOther,
}

/// Leadership arbiter for one storage root.
///
/// Owns the registry of partitions it must reload on hand-off and the
/// background watcher that detects marker changes made by other processes.
pub struct SessionLeadership {
    inner: Arc<LeadershipInner>,
    watcher: Mutex<Option<WatcherHandle>>,
}

pub(crate) struct LeadershipInner {
    marker_path: PathBuf,
    watch_root: PathBuf,
    holder_id: String,
    debounce: Duration,
    poll_interval: Duration,
    state: Mutex<LeaderState>,
    partitions: Mutex<Vec<Arc<dyn Reloadable>>>,
    subscribers: Mutex<Vec<mpsc::Sender<LeaderState>>>,
}

impl SessionLeadership {
    /// Create an arbiter with a freshly computed HolderId.
    pub fn new(ctx: &StoreContext, config: &Config) -> Self {
        Self::with_holder_id(ctx, config, marker::holder_id())
    }

    /// Create an arbiter with an explicit HolderId.
    ///
    /// Useful in tests that simulate several processes inside one, where the
    /// pid-based id would not distinguish them.
    pub fn with_holder_id(ctx: &StoreContext, config: &Config, holder_id: String) -> Self {
        Self {
            inner: Arc::new(LeadershipInner {
                marker_path: ctx.session_marker_path(),
                watch_root: ctx.root.clone(),
                holder_id,
                debounce: config.watch_debounce(),
                poll_interval: config.leadership_poll(),
                state: Mutex::new(LeaderState::Unknown),
                partitions: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// This process's HolderId.
    pub fn holder_id(&self) -> &str {
        &self.inner.holder_id
    }

    /// Register a partition to be reloaded on every hand-off to this process.
    pub fn register(&self, partition: Arc<dyn Reloadable>) {
        self.inner.lock_partitions().push(partition);
    }

    /// The last observed leadership state.
    pub fn current_state(&self) -> LeaderState {
        *self.inner.lock_state()
    }

    /// Subscribe to leadership transitions.
    ///
    /// The receiver sees one message per actual state change, starting with
    /// the first transition after subscription. Dropped receivers are pruned
    /// on the next notification.
    pub fn subscribe(&self) -> mpsc::Receiver<LeaderState> {
        let (tx, rx) = mpsc::channel();
        self.inner.lock_subscribers().push(tx);
        rx
    }

    /// Claim leadership by overwriting the session marker with our HolderId.
    ///
    /// Last-writer-wins; invoked at startup when this process is in the
    /// foreground and again on every UI focus gain. On a write failure the
    /// process conservatively stays out of `LockedByMe` and the error is
    /// returned.
    pub fn claim(&self) -> Result<LeaderState> {
        marker::write_marker(&self.inner.marker_path, &self.inner.holder_id)?;
        Ok(self.inner.resync())
    }

    /// Re-read the marker and apply any state transition now.
    ///
    /// The background watcher calls this on debounced marker changes and on
    /// every safety poll; it is also safe to call directly.
    pub fn resync(&self) -> LeaderState {
        self.inner.resync()
    }

    /// Start the background watcher.
    ///
    /// With `claim_leadership` (the foreground window at startup), leadership
    /// is claimed first; otherwise the current marker is adopted as-is.
    /// Starting an already-started arbiter is a no-op.
    pub fn start(&self, claim_leadership: bool) -> Result<()> {
        if claim_leadership {
            self.claim()?;
        } else {
            self.inner.resync();
        }

        let mut watcher = self.lock_watcher();
        if watcher.is_none() {
            *watcher = Some(watcher::spawn(Arc::clone(&self.inner))?);
        }
        Ok(())
    }

    /// Stop the background watcher. Leadership state is left as last observed.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_watcher().take() {
            handle.stop();
        }
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<WatcherHandle>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionLeadership {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LeadershipInner {
    /// Re-read the marker, transition, and fire side effects on change.
    pub(crate) fn resync(&self) -> LeaderState {
        let observed = match marker::read_marker(&self.marker_path) {
            Ok(Some(holder)) if holder == self.holder_id => LeaderState::LockedByMe,
            Ok(Some(_)) => LeaderState::LockedByOther,
            Ok(None) => LeaderState::Unknown,
            Err(e) => {
                tracing::warn!(error = %e, "session marker unreadable");
                LeaderState::Unknown
            }
        };

        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            *state = observed;
            previous
        };

        if previous == observed {
            return observed;
        }

        tracing::debug!(?previous, ?observed, holder = %self.holder_id, "leadership transition");

        // Mandatory on hand-off to us: while not leader, writes by the
        // previous leader may have bypassed our caches entirely.
        if observed == LeaderState::LockedByMe {
            self.reload_partitions();
        }

        self.notify(observed);
        observed
    }

    fn reload_partitions(&self) {
        let partitions = self.lock_partitions().clone();
        for partition in &partitions {
            if let Err(e) = partition.reload() {
                tracing::warn!(
                    partition = partition.partition_name(),
                    error = %e,
                    "failed to reload partition after leadership hand-off"
                );
            }
        }
    }

    fn notify(&self, state: LeaderState) {
        self.lock_subscribers().retain(|tx| tx.send(state).is_ok());
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LeaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_partitions(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Reloadable>>> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<LeaderState>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn marker_path(&self) -> &std::path::Path {
        &self.marker_path
    }

    pub(crate) fn watch_root(&self) -> &std::path::Path {
        &self.watch_root
    }

    pub(crate) fn debounce(&self) -> Duration {
        self.debounce
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
