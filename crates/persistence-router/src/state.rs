//! Shared connection state.
//!
//! Online/offline flag, active session id, failure timestamp and the
//! supervisor slot all live behind one lock. Callers only see transition
//! operations, never the fields themselves.

use bridge_config_and_utils::SessionId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Whether live writes go to the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Online,
    Offline,
}

/// Point-in-time copy of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub session_id: Option<SessionId>,
    pub failed_at: Option<DateTime<Utc>>,
    pub supervisor_active: bool,
    pub outages: u32,
}

/// Result of [`ConnectionTracker::mark_offline`] and
/// [`ConnectionTracker::note_offline_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineTransition {
    /// The caller claimed the supervisor slot and must start one.
    StartSupervisor,
    /// A supervisor is already running for this outage.
    AlreadySupervised,
    /// The outage ended before the buffered write was recorded.
    AlreadyOnline,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    session_id: Option<SessionId>,
    failed_at: Option<DateTime<Utc>>,
    supervisor_active: bool,
    outages: u32,
}

impl Inner {
    fn claim(&mut self, now: DateTime<Utc>) -> OfflineTransition {
        if self.failed_at.is_none() {
            self.failed_at = Some(now);
            self.outages += 1;
        }
        if self.supervisor_active {
            OfflineTransition::AlreadySupervised
        } else {
            self.supervisor_active = true;
            OfflineTransition::StartSupervisor
        }
    }
}

#[derive(Debug)]
pub struct ConnectionTracker {
    inner: Mutex<Inner>,
}

impl ConnectionTracker {
    /// Store reachable and a session is open.
    pub fn new_online(session_id: SessionId) -> Self {
        Self::with_state(ConnectionState::Online, Some(session_id))
    }

    /// Store unreachable at startup. No failure is recorded until the first
    /// reading is routed.
    pub fn new_offline() -> Self {
        Self::with_state(ConnectionState::Offline, None)
    }

    fn with_state(state: ConnectionState, session_id: Option<SessionId>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                session_id,
                failed_at: None,
                supervisor_active: false,
                outages: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let inner = self.inner.lock();
        ConnectionSnapshot {
            state: inner.state,
            session_id: inner.session_id,
            failed_at: inner.failed_at,
            supervisor_active: inner.supervisor_active,
            outages: inner.outages,
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().state == ConnectionState::Online
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().session_id
    }

    /// Enter (or stay in) the offline state.
    ///
    /// Records `now` as the failure time if none is recorded yet, and claims
    /// the supervisor slot when it is free. The claim happens under the same
    /// lock as the transition, so concurrent callers cannot both win it.
    pub fn mark_offline(&self, now: DateTime<Utc>) -> OfflineTransition {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Offline;
        inner.claim(now)
    }

    /// Record a reading that was buffered because the store was offline.
    ///
    /// Unlike [`mark_offline`](Self::mark_offline) this never changes state:
    /// if the supervisor restored the store after the caller looked, nothing
    /// is recorded and [`OfflineTransition::AlreadyOnline`] is returned.
    pub fn note_offline_write(&self, now: DateTime<Utc>) -> OfflineTransition {
        let mut inner = self.inner.lock();
        match inner.state {
            ConnectionState::Online => OfflineTransition::AlreadyOnline,
            ConnectionState::Offline => inner.claim(now),
        }
    }

    /// Record the session created during reconciliation. State stays offline.
    pub fn adopt_session(&self, session_id: SessionId) {
        self.inner.lock().session_id = Some(session_id);
    }

    /// Go back online, clear the failure time and free the supervisor slot.
    ///
    /// Returns how long the outage lasted, when a failure time was recorded.
    pub fn restore_online(&self) -> Option<Duration> {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Online;
        inner.supervisor_active = false;
        inner
            .failed_at
            .take()
            .and_then(|failed_at| (Utc::now() - failed_at).to_std().ok())
    }

    /// Free the supervisor slot without changing state (supervisor cancelled).
    pub fn release_supervisor(&self) {
        self.inner.lock().supervisor_active = false;
    }
}
