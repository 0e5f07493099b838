//! Primary store error types.

use std::time::Duration;
use thiserror::Error;

/// Primary store error type.
///
/// Every variant means the operation did not take effect; callers treat all
/// of them as "store unreachable" for routing purposes.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not open or keep a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation exceeded its time bound
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store answered but is not usable (liveness probe returned nothing)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
