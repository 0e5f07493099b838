//! Data model shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session id written to the fallback buffer when no session exists yet.
pub const SENTINEL_SESSION_ID: i64 = -1;

/// Value carried by a sentinel record (malformed input, lifecycle failures).
pub const SENTINEL_VALUE: f64 = -1.0;

/// Identifier of an acquisition session as assigned by the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(i64);

impl SessionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parsed sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Measured value (the voltage field of the line).
    pub value: f64,
    /// Milliseconds since the acquisition timer started.
    pub elapsed_ms: u64,
    /// Decimal places of the value as received (`2.10` has 2). The fallback
    /// buffer writes the value back with this many places.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u8>,
}

impl Reading {
    pub fn new(value: f64, elapsed_ms: u64) -> Self {
        Self {
            value,
            elapsed_ms,
            scale: None,
        }
    }

    pub fn with_scale(mut self, scale: Option<u8>) -> Self {
        self.scale = scale;
        self
    }

    /// Placeholder reading for input that could not be parsed.
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_VALUE, 0)
    }
}

/// Why a record landed in the fallback buffer.
///
/// The set is closed and no variant contains the CSV separator, so the
/// `NOTE` column never needs escaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordNote {
    /// A live insert failed and the store just went offline.
    FallbackModeOn,
    /// The store was already known to be offline.
    FallbackMode,
    /// The line could not be parsed.
    Malformed,
    /// The session could not be created at startup.
    StoreUnavailableAtStartup,
    /// The session could not be closed at shutdown.
    SessionCloseFailed,
}

impl RecordNote {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordNote::FallbackModeOn => "Fallback mode ON",
            RecordNote::FallbackMode => "Fallback mode",
            RecordNote::Malformed => "Malformed or unreadable data",
            RecordNote::StoreUnavailableAtStartup => "Error on SQL Server connection",
            RecordNote::SessionCloseFailed => "Error updating log end time",
        }
    }
}

impl fmt::Display for RecordNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the fallback buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedRecord {
    pub value: f64,
    pub elapsed_ms: u64,
    /// See [`Reading::scale`].
    pub scale: Option<u8>,
    /// `None` is written as [`SENTINEL_SESSION_ID`].
    pub session_id: Option<SessionId>,
    pub note: RecordNote,
}

impl BufferedRecord {
    pub fn from_reading(reading: Reading, session_id: Option<SessionId>, note: RecordNote) -> Self {
        Self {
            value: reading.value,
            elapsed_ms: reading.elapsed_ms,
            scale: reading.scale,
            session_id,
            note,
        }
    }

    /// Sentinel record (`-1,0,<session>,<note>`).
    pub fn sentinel(session_id: Option<SessionId>, note: RecordNote) -> Self {
        Self::from_reading(Reading::sentinel(), session_id, note)
    }

    /// Value as written to disk, keeping the received decimal places.
    pub fn value_column(&self) -> String {
        match self.scale {
            Some(scale) => format!("{:.*}", usize::from(scale), self.value),
            None => self.value.to_string(),
        }
    }

    /// Session id as written to disk.
    pub fn session_column(&self) -> i64 {
        self.session_id
            .map(SessionId::get)
            .unwrap_or(SENTINEL_SESSION_ID)
    }
}

/// Item handed from the ingestor to the router's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// A well-formed line.
    Reading(Reading),
    /// A line that failed to parse; routed to the fallback path.
    Malformed { raw: String, reason: String },
}
