//! Tests for session leadership arbitration.

use super::*;
use crate::partition::Partition;
use crate::store::{JsonFileStore, SharedStateStore};
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn fast_config() -> Config {
    Config {
        lock_retry_interval_ms: 5,
        lock_retry_budget: 200,
        watch_debounce_ms: 10,
        leadership_poll_ms: 50,
        ..Config::default()
    }
}

fn make_ctx() -> (TempDir, StoreContext) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = StoreContext::resolve(temp_dir.path());
    ctx.ensure_layout().unwrap();
    (temp_dir, ctx)
}

fn make_arbiter(ctx: &StoreContext, id: &str) -> SessionLeadership {
    SessionLeadership::with_holder_id(ctx, &fast_config(), id.to_string())
}

/// Poll until the condition holds or the deadline passes.
fn wait_for(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn claim_makes_this_process_leader() {
    let (_temp_dir, ctx) = make_ctx();
    let arbiter = make_arbiter(&ctx, "window-a");

    assert_eq!(arbiter.current_state(), LeaderState::Unknown);
    assert_eq!(arbiter.claim().unwrap(), LeaderState::LockedByMe);

    let content = std::fs::read_to_string(ctx.session_marker_path()).unwrap();
    assert_eq!(content, "window-a");
}

#[test]
fn exactly_one_leader_after_both_claim() {
    let (_temp_dir, ctx) = make_ctx();
    let a = make_arbiter(&ctx, "window-a");
    let b = make_arbiter(&ctx, "window-b");

    a.claim().unwrap();
    b.claim().unwrap();

    // Both stabilize against the final marker content.
    a.resync();
    b.resync();

    let leaders = [a.current_state(), b.current_state()]
        .iter()
        .filter(|s| **s == LeaderState::LockedByMe)
        .count();
    assert_eq!(leaders, 1);
    assert_eq!(b.current_state(), LeaderState::LockedByMe);
    assert_eq!(a.current_state(), LeaderState::LockedByOther);
}

#[test]
fn missing_marker_resolves_to_unknown() {
    let (_temp_dir, ctx) = make_ctx();
    let arbiter = make_arbiter(&ctx, "window-a");
    assert_eq!(arbiter.resync(), LeaderState::Unknown);
}

#[test]
fn unreadable_marker_is_nonfatal_and_not_leader() {
    let (_temp_dir, ctx) = make_ctx();
    // A directory where the marker file should be makes reads fail outright.
    std::fs::create_dir(ctx.session_marker_path()).unwrap();

    let arbiter = make_arbiter(&ctx, "window-a");
    assert_eq!(arbiter.resync(), LeaderState::Unknown);
}

#[test]
fn claim_failure_leaves_state_untouched() {
    let temp_dir = TempDir::new().unwrap();
    // The storage root is a regular file; the marker can never be written.
    let bogus_root = temp_dir.path().join("not-a-directory");
    std::fs::write(&bogus_root, "x").unwrap();
    let ctx = StoreContext::resolve(&bogus_root);

    let arbiter = make_arbiter(&ctx, "window-a");
    assert!(arbiter.claim().is_err());
    assert_eq!(arbiter.current_state(), LeaderState::Unknown);
}

#[test]
fn notifications_fire_only_on_transitions() {
    let (_temp_dir, ctx) = make_ctx();
    let arbiter = make_arbiter(&ctx, "window-a");
    let events = arbiter.subscribe();

    arbiter.claim().unwrap();
    assert_eq!(events.recv_timeout(Duration::from_secs(1)).unwrap(), LeaderState::LockedByMe);

    // Repeated resyncs without a marker change are silent.
    arbiter.resync();
    arbiter.resync();
    assert!(events.try_recv().is_err());

    // Another process takes over.
    std::fs::write(ctx.session_marker_path(), "window-b").unwrap();
    arbiter.resync();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(1)).unwrap(),
        LeaderState::LockedByOther
    );
}

#[test]
fn handoff_reloads_registered_partitions() {
    let (_temp_dir, ctx) = make_ctx();
    let config = fast_config();

    // Two stores over one root stand in for two window processes.
    let store_a: Arc<dyn SharedStateStore> = Arc::new(JsonFileStore::new(&ctx).unwrap());
    let store_b: Arc<dyn SharedStateStore> = Arc::new(JsonFileStore::new(&ctx).unwrap());

    let counter_a = Partition::new(&ctx, &config, "counter", store_a, 0i64).unwrap();
    let counter_b = Partition::new(&ctx, &config, "counter", store_b, 0i64).unwrap();

    let a = make_arbiter(&ctx, "window-a");
    let b = make_arbiter(&ctx, "window-b");
    a.register(counter_a.reloader());
    b.register(counter_b.reloader());

    // A leads and commits a change; B's cache still holds the old value.
    a.claim().unwrap();
    counter_a
        .transaction(|count| {
            *count = 5;
            Ok(())
        })
        .wait()
        .unwrap();
    assert_eq!(counter_b.read(), 0);

    // B claims leadership; its reload must fire before claim returns.
    assert_eq!(b.claim().unwrap(), LeaderState::LockedByMe);
    assert_eq!(counter_b.read(), 5);
}

#[test]
fn regaining_leadership_reloads_again() {
    let (_temp_dir, ctx) = make_ctx();
    let config = fast_config();
    let store: Arc<dyn SharedStateStore> = Arc::new(JsonFileStore::new(&ctx).unwrap());
    let counter = Partition::new(&ctx, &config, "counter", Arc::clone(&store), 0i64).unwrap();

    let a = make_arbiter(&ctx, "window-a");
    a.register(counter.reloader());

    a.claim().unwrap();

    // Leadership moves away, the state changes underneath us.
    std::fs::write(ctx.session_marker_path(), "window-b").unwrap();
    assert_eq!(a.resync(), LeaderState::LockedByOther);
    store.set("counter", serde_json::json!(9)).unwrap();
    assert_eq!(counter.read(), 0);

    // Regaining leadership resynchronizes the cache.
    a.claim().unwrap();
    assert_eq!(counter.read(), 9);
}

#[test]
#[serial]
fn watcher_detects_external_claims() {
    let (_temp_dir, ctx) = make_ctx();
    let a = make_arbiter(&ctx, "window-a");
    let b = make_arbiter(&ctx, "window-b");

    // A starts in the foreground and claims; B starts in the background.
    a.start(true).unwrap();
    b.start(false).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        b.current_state() == LeaderState::LockedByOther
    }));

    // B's window gains focus and claims; A must notice without being told.
    b.claim().unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        a.current_state() == LeaderState::LockedByOther
    }));
    assert_eq!(b.current_state(), LeaderState::LockedByMe);

    a.stop();
    b.stop();
}

#[test]
#[serial]
fn watcher_transition_reaches_subscribers() {
    let (_temp_dir, ctx) = make_ctx();
    let arbiter = make_arbiter(&ctx, "window-a");
    let events = arbiter.subscribe();

    arbiter.start(false).unwrap();

    // An external claim appears; the watcher (or safety poll) must surface it.
    std::fs::write(ctx.session_marker_path(), "window-b").unwrap();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(2)).unwrap(),
        LeaderState::LockedByOther
    );

    arbiter.stop();
}

#[test]
#[serial]
fn start_is_idempotent_and_stop_joins() {
    let (_temp_dir, ctx) = make_ctx();
    let arbiter = make_arbiter(&ctx, "window-a");

    arbiter.start(true).unwrap();
    arbiter.start(true).unwrap();
    assert_eq!(arbiter.current_state(), LeaderState::LockedByMe);

    arbiter.stop();
    arbiter.stop();
}

#[test]
fn holder_ids_are_unique_per_instance() {
    let first = holder_id();
    thread::sleep(Duration::from_millis(2));
    let second = holder_id();
    assert_ne!(first, second);
    assert!(first.contains('@'));
}
