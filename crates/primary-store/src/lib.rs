//! # Primary Store
//!
//! Relational sink of record for acquisition sessions and their readings.
//!
//! The store is reached through the [`PrimaryStore`] trait. Every method is
//! one self-contained operation: it either takes effect or returns a
//! [`StoreError`], and no failure leaves a connection behind for the next
//! call to trip over. Callers treat any error as "store unreachable".
//!
//! ```text
//! sessions (id, started_at, ended_at)
//!     ^
//!     | session_id
//! readings (id, value, elapsed_ms, session_id)
//! ```
//!
//! Two implementations ship here:
//!
//! - [`SqliteStore`]: the production backend, a SQLite file opened per
//!   operation with a hard time bound
//! - `MemoryStore`: a scriptable in-memory double, compiled for this crate's
//!   tests and for dependents that enable the `test-util` feature

mod error;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod migrations;
mod models;
pub mod queries;
mod sqlite;

pub use error::{StoreError, StoreResult};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{StoredReading, StoredSession};
pub use sqlite::{SqliteStore, SqliteStoreOptions};

use async_trait::async_trait;
use bridge_config_and_utils::{Reading, SessionId};
use chrono::{DateTime, Utc};

/// Operations the bridge needs from its store of record.
#[async_trait]
pub trait PrimaryStore: Send + Sync + 'static {
    /// Create a session and return the id the store assigned to it.
    async fn create_session(&self, started_at: DateTime<Utc>) -> StoreResult<SessionId>;

    /// Record the end time of a session.
    async fn close_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()>;

    /// Insert one reading under a session.
    async fn insert_reading(&self, reading: Reading, session_id: SessionId) -> StoreResult<()>;

    /// Cheap liveness check. Writes nothing.
    async fn probe(&self) -> StoreResult<()>;
}

