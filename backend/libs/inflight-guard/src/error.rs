//! Error types for the in-flight guard library

use thiserror::Error;

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors that can occur while acquiring or releasing an in-flight slot
#[derive(Error, Debug)]
pub enum GuardError {
    /// Database operation failed (advisory lock acquisition, pool exhaustion, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key does not fit the 32-bit advisory lock keyspace
    #[error("Key {0} is outside the advisory lock range")]
    KeyOutOfRange(i64),
}

impl GuardError {
    /// Check if error is transient (caller may retry the trigger later)
    pub fn is_transient(&self) -> bool {
        match self {
            GuardError::Database(sqlx_err) => matches!(
                sqlx_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            GuardError::KeyOutOfRange(_) => false,
        }
    }
}
