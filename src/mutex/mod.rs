//! Cross-process mutual exclusion over marker files.
//!
//! A [`FileMutex`] guards one named critical section across an unbounded
//! number of OS processes using only the filesystem:
//!
//! - Markers live in `<root>/locks/<name>.lock` and are created with
//!   **create_new** semantics (exclusive create), so only one process can
//!   hold a given lock at a time.
//! - Each marker contains JSON metadata: the holder (`user@HOST`), pid,
//!   RFC3339 creation timestamp, and the action being performed.
//! - Acquisition retries on a fixed interval up to a bounded budget; a marker
//!   older than the staleness threshold is presumed abandoned (crashed or
//!   leaked holder) and is forcibly reclaimed without consuming a retry slot.
//! - Locks are released through RAII [`MutexGuard`]s; release happens on
//!   every exit path, including panics, and tolerates an already-absent file.
//!
//! Bounding `acquire` trades liveness for safety: a crashed holder cannot
//! wedge the system longer than the staleness threshold, at the cost of a
//! double-acquire window under severe clock skew or a critical section that
//! legitimately outlives the threshold.

mod guard;
mod metadata;
mod operations;


pub use guard::MutexGuard;
pub use metadata::HolderMetadata;
pub(crate) use metadata::owner_string;
pub use operations::FileMutex;
