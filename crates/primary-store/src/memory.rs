//! In-memory primary store with scriptable availability.
//!
//! Used by tests across the workspace to drive outages and recoveries
//! deterministically, including under paused tokio time.

use crate::{PrimaryStore, StoreError, StoreResult, StoredReading, StoredSession};
use async_trait::async_trait;
use bridge_config_and_utils::{Reading, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
struct MemoryState {
    available: bool,
    probe_script: VecDeque<bool>,
    latency: Option<Duration>,
    sessions: Vec<StoredSession>,
    readings: Vec<StoredReading>,
    next_session_id: i64,
    next_reading_id: i64,
    probe_count: usize,
}

/// Primary store kept entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A reachable, empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                available: true,
                probe_script: VecDeque::new(),
                latency: None,
                sessions: Vec::new(),
                readings: Vec::new(),
                next_session_id: 1,
                next_reading_id: 1,
                probe_count: 0,
            }),
        }
    }

    /// A store that refuses every operation until [`set_available`](Self::set_available).
    pub fn unavailable() -> Self {
        let store = Self::new();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    /// Queue probe outcomes. Each probe consumes one entry; once the script
    /// runs out probes follow the availability flag.
    pub fn script_probes(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.state.lock().probe_script.extend(outcomes);
    }

    /// Delay every operation by `latency` before it takes effect.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// All readings accepted so far, in arrival order.
    pub fn readings(&self) -> Vec<StoredReading> {
        self.state.lock().readings.clone()
    }

    /// All sessions created so far.
    pub fn sessions(&self) -> Vec<StoredSession> {
        self.state.lock().sessions.clone()
    }

    pub fn session(&self, id: SessionId) -> Option<StoredSession> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Number of liveness probes received.
    pub fn probe_count(&self) -> usize {
        self.state.lock().probe_count
    }

    async fn delay(&self) {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_available(state: &MemoryState) -> StoreResult<()> {
        if state.available {
            Ok(())
        } else {
            Err(StoreError::Connection("store unreachable".to_string()))
        }
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn create_session(&self, started_at: DateTime<Utc>) -> StoreResult<SessionId> {
        self.delay().await;
        let mut state = self.state.lock();
        Self::check_available(&state)?;

        let id = SessionId::new(state.next_session_id);
        state.next_session_id += 1;
        state.sessions.push(StoredSession {
            id,
            started_at,
            ended_at: None,
        });
        Ok(id)
    }

    async fn close_session(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        Self::check_available(&state)?;

        match state.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.ended_at = Some(ended_at);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("session {}", id))),
        }
    }

    async fn insert_reading(&self, reading: Reading, session_id: SessionId) -> StoreResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        Self::check_available(&state)?;

        if !state.sessions.iter().any(|s| s.id == session_id) {
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }

        let id = state.next_reading_id;
        state.next_reading_id += 1;
        state.readings.push(StoredReading {
            id,
            value: reading.value,
            elapsed_ms: reading.elapsed_ms,
            session_id,
        });
        Ok(())
    }

    async fn probe(&self) -> StoreResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.probe_count += 1;

        let reachable = match state.probe_script.pop_front() {
            Some(outcome) => outcome,
            None => state.available,
        };
        if reachable {
            Ok(())
        } else {
            Err(StoreError::Unavailable("probe failed".to_string()))
        }
    }
}
