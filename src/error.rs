//! Error types for crosslock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use thiserror::Error;

/// Main error type for crosslock operations.
#[derive(Error, Debug)]
pub enum CrosslockError {
    /// Configuration file could not be read or failed validation.
    #[error("{0}")]
    Config(String),

    /// The underlying key-value store failed to read or write.
    #[error("Store operation failed: {0}")]
    Store(String),

    /// A lock marker could not be created, read, or removed.
    #[error("Lock operation failed: {0}")]
    Lock(String),

    /// Lock acquisition exhausted its retry budget without acquiring.
    ///
    /// No state change occurred; the critical section was never entered.
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),

    /// A transaction modifier returned an error or panicked.
    ///
    /// Guarantees no partial persistence: the store and the partition cache
    /// are exactly as they were before the attempt.
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// The session marker could not be written or read.
    ///
    /// Non-fatal: the process conservatively stays out of leadership rather
    /// than assuming unverifiable authority.
    #[error("Leadership indeterminate: {0}")]
    LeadershipIndeterminate(String),

    /// The task queue worker is gone; the enqueued task will never run.
    #[error("Task queue closed: {0}")]
    QueueClosed(String),
}

/// Result type alias for crosslock operations.
pub type Result<T> = std::result::Result<T, CrosslockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = CrosslockError::LockTimeout("lock 'inventory' held elsewhere".to_string());
        assert_eq!(
            err.to_string(),
            "Lock acquisition timed out: lock 'inventory' held elsewhere"
        );

        let err = CrosslockError::Transaction("modifier rejected capacity".to_string());
        assert_eq!(
            err.to_string(),
            "Transaction failed: modifier rejected capacity"
        );
    }

    #[test]
    fn leadership_errors_name_the_marker_problem() {
        let err = CrosslockError::LeadershipIndeterminate("marker unreadable".to_string());
        assert!(err.to_string().contains("marker unreadable"));
    }
}
