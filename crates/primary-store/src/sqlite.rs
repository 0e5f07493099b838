//! SQLite-backed primary store.
//!
//! Every operation opens its own connection, runs on tokio-rusqlite's
//! dedicated thread, and is bounded by the configured timeout:
//!
//! - a store that has gone away fails the next operation instead of
//!   poisoning a long-lived handle
//! - the caller's task is parked, never blocked, while SQLite works
//! - a hung file system surfaces as [`StoreError::Timeout`] after the bound
//!
//! Only SQL runs inside `call()`.

use crate::{
    migrations, queries, PrimaryStore, StoreError, StoreResult, StoredReading, StoredSession,
};
use async_trait::async_trait;
use bridge_config_and_utils::{Reading, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::OpenFlags;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Convert a tokio_rusqlite::Error to StoreError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Options for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct SqliteStoreOptions {
    /// Create the database file (and its directory) when missing.
    pub create_if_missing: bool,
    /// Upper bound on connect + query for a single operation.
    pub timeout: Duration,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Primary store on a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    options: SqliteStoreOptions,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>, options: SqliteStoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a session (inspection and tests).
    pub async fn session(&self, id: SessionId) -> StoreResult<Option<StoredSession>> {
        self.call("get_session", move |conn| queries::get_session(conn, id))
            .await
    }

    /// A session's readings in arrival order (inspection and tests).
    pub async fn readings(&self, session_id: SessionId) -> StoreResult<Vec<StoredReading>> {
        self.call("list_readings", move |conn| {
            queries::list_readings(conn, session_id)
        })
        .await
    }

    /// Run `f` on a fresh connection, bounded by the configured timeout.
    async fn call<F, T>(&self, op: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let bound = self.options.timeout;
        match tokio::time::timeout(bound, self.call_unbounded(f)).await {
            Ok(result) => {
                if let Err(err) = &result {
                    debug!(op, error = %err, "Store operation failed");
                }
                result
            }
            Err(_) => {
                debug!(op, timeout_ms = bound.as_millis() as u64, "Store operation timed out");
                Err(StoreError::Timeout(bound))
            }
        }
    }

    async fn call_unbounded<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connect().await?;
        let busy_timeout = self.options.timeout;

        let outer_result = conn
            .call(move |conn| {
                let conn: &rusqlite::Connection = conn;
                let inner_result = prepare(conn, busy_timeout).and_then(|()| f(conn));
                Ok(inner_result)
            })
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    async fn connect(&self) -> StoreResult<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        if self.options.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Connection(format!(
                            "cannot create {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        Connection::open_with_flags(&self.path, flags)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

/// Per-connection setup: pragmas plus schema bootstrap.
fn prepare(conn: &rusqlite::Connection, busy_timeout: Duration) -> StoreResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrations::run_migrations(conn)
}

#[async_trait]
impl PrimaryStore for SqliteStore {
    async fn create_session(&self, started_at: DateTime<Utc>) -> StoreResult<SessionId> {
        self.call("create_session", move |conn| {
            queries::insert_session(conn, started_at)
        })
        .await
    }

    async fn close_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()> {
        self.call("close_session", move |conn| {
            queries::finish_session(conn, id, ended_at)
        })
        .await
    }

    async fn insert_reading(&self, reading: Reading, session_id: SessionId) -> StoreResult<()> {
        self.call("insert_reading", move |conn| {
            queries::insert_reading(conn, &reading, session_id)
        })
        .await
    }

    async fn probe(&self) -> StoreResult<()> {
        self.call("probe", queries::probe).await
    }
}
