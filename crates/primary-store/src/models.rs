//! Row types read back from the primary store.

use bridge_config_and_utils::SessionId;
use chrono::{DateTime, Utc};

/// A row of the `sessions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A row of the `readings` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: i64,
    pub value: f64,
    pub elapsed_ms: u64,
    pub session_id: SessionId,
}
