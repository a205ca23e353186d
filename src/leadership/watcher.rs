//! Background marker watching: filesystem events plus a safety poll.
//!
//! The storage root is watched non-recursively; events touching the session
//! marker are debounced for a quiet window before a resync runs. Filesystem
//! notifications can be missed or coalesced by the platform, so the event
//! wait doubles as a periodic safety poll: every `recv_timeout` expiry
//! resyncs unconditionally. If the platform watcher cannot be created at
//! all, the loop degrades to poll-only with a warning.

use super::LeadershipInner;
use crate::error::{CrosslockError, Result};
use notify::{Event, RecursiveMode, Watcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Handle to the watcher thread; stopping joins it.
#[derive(Debug)]
pub(super) struct WatcherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    pub(super) fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("leadership watcher thread terminated abnormally");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub(super) fn spawn(inner: Arc<LeadershipInner>) -> Result<WatcherHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    // If the platform watcher fails, tx is dropped with it and the loop
    // below sees a disconnected channel, which it treats as poll-only mode.
    let watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    }) {
        Ok(mut watcher) => match watcher.watch(inner.watch_root(), RecursiveMode::NonRecursive) {
            Ok(()) => Some(watcher),
            Err(e) => {
                tracing::warn!(
                    root = %inner.watch_root().display(),
                    error = %e,
                    "filesystem watch unavailable; leadership falls back to polling"
                );
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "failed to create filesystem watcher; leadership falls back to polling");
            None
        }
    };

    let thread = thread::Builder::new()
        .name("crosslock-leadership".to_string())
        .spawn({
            let inner = Arc::clone(&inner);
            let stop = Arc::clone(&stop);
            move || {
                // Keeps the platform watcher alive for the loop's lifetime.
                let _watcher = watcher;
                run_loop(&inner, &rx, &stop);
            }
        })
        .map_err(|e| {
            CrosslockError::LeadershipIndeterminate(format!(
                "failed to spawn leadership watcher: {}",
                e
            ))
        })?;

    Ok(WatcherHandle {
        stop,
        thread: Some(thread),
    })
}

fn run_loop(inner: &LeadershipInner, events: &Receiver<Event>, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match events.recv_timeout(inner.poll_interval()) {
            Ok(event) => {
                if !touches_marker(&event, inner) {
                    continue;
                }
                debounce(events, inner.debounce());
                inner.resync();
            }
            Err(RecvTimeoutError::Timeout) => {
                // Safety poll covering missed or coalesced events.
                inner.resync();
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Poll-only mode: no platform watcher.
                thread::sleep(inner.poll_interval());
                inner.resync();
            }
        }
    }
}

/// Whether an event concerns the session marker.
///
/// Events without paths are treated as relevant; resyncing on a false
/// positive is harmless, missing a real change is not.
fn touches_marker(event: &Event, inner: &LeadershipInner) -> bool {
    if event.paths.is_empty() {
        return true;
    }
    event.paths.iter().any(|path| {
        path == inner.marker_path()
            || path.file_name() == inner.marker_path().file_name()
    })
}

/// Absorb the burst of events around one marker rewrite.
fn debounce(events: &Receiver<Event>, window: Duration) {
    let deadline = Instant::now() + window;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        if events.recv_timeout(deadline - now).is_err() {
            return;
        }
    }
}
