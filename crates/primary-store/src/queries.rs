//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter, so they run
//! the same inside the per-operation executor and in plain unit tests.

use crate::{StoreError, StoreResult, StoredReading, StoredSession};
use bridge_config_and_utils::{Reading, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

// ==========================================
// Sessions
// ==========================================

/// Insert a new session and return its generated id.
pub fn insert_session(conn: &Connection, started_at: DateTime<Utc>) -> StoreResult<SessionId> {
    conn.execute(
        "INSERT INTO sessions (started_at) VALUES (?1)",
        params![started_at.to_rfc3339()],
    )?;
    let id = SessionId::new(conn.last_insert_rowid());
    debug!(session_id = %id, "Inserted session");
    Ok(id)
}

/// Set `ended_at` on a session.
pub fn finish_session(
    conn: &Connection,
    id: SessionId,
    ended_at: DateTime<Utc>,
) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
        params![ended_at.to_rfc3339(), id.get()],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("session {}", id)));
    }
    Ok(())
}

/// Get a session by id.
pub fn get_session(conn: &Connection, id: SessionId) -> StoreResult<Option<StoredSession>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, started_at, ended_at FROM sessions WHERE id = ?1")?;

    let result = stmt.query_row(params![id.get()], |row| {
        Ok(StoredSession {
            id: SessionId::new(row.get(0)?),
            started_at: parse_datetime(row.get::<_, String>(1)?),
            ended_at: row.get::<_, Option<String>>(2)?.map(parse_datetime),
        })
    });

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Readings
// ==========================================

/// Insert one reading under `session_id`.
pub fn insert_reading(conn: &Connection, reading: &Reading, session_id: SessionId) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO readings (value, elapsed_ms, session_id) VALUES (?1, ?2, ?3)",
        params![reading.value, reading.elapsed_ms as i64, session_id.get()],
    )?;
    Ok(())
}

/// List a session's readings in insertion order.
pub fn list_readings(conn: &Connection, session_id: SessionId) -> StoreResult<Vec<StoredReading>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, value, elapsed_ms, session_id FROM readings WHERE session_id = ?1 ORDER BY id",
    )?;

    let readings = stmt
        .query_map(params![session_id.get()], |row| {
            Ok(StoredReading {
                id: row.get(0)?,
                value: row.get(1)?,
                elapsed_ms: row.get::<_, i64>(2)? as u64,
                session_id: SessionId::new(row.get(3)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(readings)
}

// ==========================================
// Liveness
// ==========================================

/// Trivial query used only to test reachability.
pub fn probe(conn: &Connection) -> StoreResult<()> {
    let value: Option<i64> = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    match value {
        Some(_) => Ok(()),
        None => Err(StoreError::Unavailable("probe returned no value".to_string())),
    }
}

fn parse_datetime(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
