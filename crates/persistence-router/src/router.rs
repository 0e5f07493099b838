//! Persistence router.

use crate::{
    ConnectionState, ConnectionTracker, OfflineTransition, PersistenceConfig,
    ReconnectionSupervisor, SupervisorExit,
};
use bridge_config_and_utils::{BufferedRecord, Ingested, Reading, RecordNote, SessionId};
use chrono::Utc;
use fallback_buffer::FallbackBuffer;
use parking_lot::Mutex;
use primary_store::PrimaryStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Where a routed item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written to the primary store.
    Stored,
    /// Appended to the fallback buffer with this note.
    Buffered(RecordNote),
    /// Neither sink took it.
    Lost,
}

/// Running totals, reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub stored: u64,
    pub buffered: u64,
    pub malformed: u64,
    pub lost: u64,
}

/// Decides, per reading, between the primary store and the fallback buffer.
pub struct PersistenceRouter<S: PrimaryStore> {
    store: Arc<S>,
    buffer: Arc<FallbackBuffer>,
    tracker: Arc<ConnectionTracker>,
    config: PersistenceConfig,
    stats: Mutex<RouterStats>,
    supervisor: Mutex<Option<JoinHandle<SupervisorExit>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<S: PrimaryStore> PersistenceRouter<S> {
    pub fn new(
        store: Arc<S>,
        buffer: Arc<FallbackBuffer>,
        tracker: Arc<ConnectionTracker>,
        config: PersistenceConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            buffer,
            tracker,
            config,
            stats: Mutex::new(RouterStats::default()),
            supervisor: Mutex::new(None),
            shutdown_tx,
        }
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn stats(&self) -> RouterStats {
        *self.stats.lock()
    }

    /// Route one item from the ingest queue.
    pub async fn handle(&self, item: Ingested) -> RouteOutcome {
        match item {
            Ingested::Reading(reading) => self.route(reading).await,
            Ingested::Malformed { raw, reason } => {
                warn!(raw = %raw, reason = %reason, "Malformed line routed to fallback buffer");
                self.stats.lock().malformed += 1;
                self.buffer_sentinel(RecordNote::Malformed)
            }
        }
    }

    /// Persist a reading under the active session.
    ///
    /// Never fails: a store failure falls back to the buffer, and a buffer
    /// failure is counted as lost (and logged by the buffer).
    pub async fn route(&self, reading: Reading) -> RouteOutcome {
        let snapshot = self.tracker.snapshot();

        let session_id = match (snapshot.state, snapshot.session_id) {
            (ConnectionState::Online, Some(id)) => id,
            (_, session_id) => {
                let outcome = self.buffer_reading(reading, session_id, RecordNote::FallbackMode);
                let transition = self.tracker.note_offline_write(Utc::now());
                self.after_offline(transition);
                return outcome;
            }
        };

        match timeout(
            self.config.store_timeout,
            self.store.insert_reading(reading, session_id),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(
                    session_id = %session_id,
                    value = reading.value,
                    elapsed_ms = reading.elapsed_ms,
                    "Reading stored"
                );
                self.stats.lock().stored += 1;
                RouteOutcome::Stored
            }
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Primary insert failed; switching to fallback mode");
                self.fail_over(reading, session_id)
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_ms = self.config.store_timeout.as_millis() as u64,
                    "Primary insert timed out; switching to fallback mode"
                );
                self.fail_over(reading, session_id)
            }
        }
    }

    /// Append a `-1,0,<session>,<note>` record carrying the active session.
    pub fn buffer_sentinel(&self, note: RecordNote) -> RouteOutcome {
        let record = BufferedRecord::sentinel(self.tracker.session_id(), note);
        self.append(&record)
    }

    fn fail_over(&self, reading: Reading, session_id: SessionId) -> RouteOutcome {
        let outcome = self.buffer_reading(reading, Some(session_id), RecordNote::FallbackModeOn);
        let transition = self.tracker.mark_offline(Utc::now());
        self.after_offline(transition);
        outcome
    }

    fn buffer_reading(
        &self,
        reading: Reading,
        session_id: Option<SessionId>,
        note: RecordNote,
    ) -> RouteOutcome {
        let record = BufferedRecord::from_reading(reading, session_id, note);
        self.append(&record)
    }

    fn append(&self, record: &BufferedRecord) -> RouteOutcome {
        match self.buffer.append(record) {
            Ok(_) => {
                self.stats.lock().buffered += 1;
                RouteOutcome::Buffered(record.note)
            }
            Err(_) => {
                // Already reported on the data-loss target.
                self.stats.lock().lost += 1;
                RouteOutcome::Lost
            }
        }
    }

    fn after_offline(&self, transition: OfflineTransition) {
        if transition == OfflineTransition::StartSupervisor {
            warn!(
                session_id = self.tracker.session_id().map(|id| id.get()),
                "Primary store offline; readings go to the fallback buffer"
            );
            self.start_supervisor();
        }
    }

    fn start_supervisor(&self) {
        let supervisor = ReconnectionSupervisor::new(
            self.store.clone(),
            self.tracker.clone(),
            self.config.clone(),
            self.shutdown_tx.subscribe(),
        );
        let handle = supervisor.spawn();
        *self.supervisor.lock() = Some(handle);
    }

    /// Cancel a running supervisor and wait for it to stop.
    ///
    /// Returns how the most recent supervisor ended, if one was ever started.
    pub async fn shutdown_supervisor(&self) -> Option<SupervisorExit> {
        self.shutdown_tx.send_replace(true);
        let handle = self.supervisor.lock().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(exit) => Some(exit),
                Err(e) => {
                    warn!(error = %e, "Reconnection supervisor task failed");
                    None
                }
            },
            None => {
                info!("No reconnection supervisor to stop");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primary_store::MemoryStore;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn config() -> PersistenceConfig {
        PersistenceConfig {
            poll_interval: Duration::from_secs(20),
            grace_period: Duration::from_secs(20),
            store_timeout: Duration::from_secs(3),
        }
    }

    fn router(
        store: Arc<MemoryStore>,
        tracker: ConnectionTracker,
        dir: &Path,
    ) -> PersistenceRouter<MemoryStore> {
        PersistenceRouter::new(
            store,
            Arc::new(FallbackBuffer::new(dir)),
            Arc::new(tracker),
            config(),
        )
    }

    /// Data lines of every day file, oldest file first.
    fn buffered_lines(dir: &Path) -> Vec<String> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .map(|entries| entries.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default();
        files.sort();
        files
            .iter()
            .flat_map(|path| {
                std::fs::read_to_string(path)
                    .unwrap()
                    .lines()
                    .skip(1)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    async fn online_router(dir: &Path) -> (Arc<MemoryStore>, PersistenceRouter<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = store.create_session(Utc::now()).await.unwrap();
        let router = router(store.clone(), ConnectionTracker::new_online(session), dir);
        (store, router)
    }

    #[tokio::test(start_paused = true)]
    async fn online_readings_are_stored_in_order() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;

        assert_eq!(router.route(Reading::new(2.05, 10)).await, RouteOutcome::Stored);
        assert_eq!(router.route(Reading::new(2.10, 20)).await, RouteOutcome::Stored);

        let rows = store.readings();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 2.05);
        assert_eq!(rows[1].value, 2.10);
        assert!(rows.iter().all(|r| r.session_id == store.sessions()[0].id));
        assert!(buffered_lines(dir.path()).is_empty());
        assert_eq!(router.stats().stored, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insert_buffers_and_goes_offline() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;
        let session = store.sessions()[0].id;

        router.route(Reading::new(2.05, 10)).await;
        store.set_available(false);

        let outcome = router.route(Reading::new(1.99, 4210)).await;
        assert_eq!(outcome, RouteOutcome::Buffered(RecordNote::FallbackModeOn));

        assert_eq!(store.readings().len(), 1);
        assert_eq!(
            buffered_lines(dir.path()),
            vec![format!("1.99,4210,{},Fallback mode ON", session)]
        );
        let snapshot = router.tracker().snapshot();
        assert_eq!(snapshot.state, ConnectionState::Offline);
        assert!(snapshot.failed_at.is_some());
        assert!(snapshot.supervisor_active);

        router.shutdown_supervisor().await;
    }

    #[tokio::test(start_paused = true)]
    async fn offline_readings_keep_arrival_order_with_one_supervisor() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;
        store.set_available(false);

        for i in 0..5u64 {
            router.route(Reading::new(i as f64, i)).await;
        }

        let lines = buffered_lines(dir.path());
        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("Fallback mode ON"));
        for (i, line) in lines.iter().enumerate().skip(1) {
            assert!(line.starts_with(&format!("{},{},", i, i)));
            assert!(line.ends_with(",Fallback mode"));
        }

        // One supervisor means one probe per interval.
        sleep(Duration::from_secs(41)).await;
        assert_eq!(store.probe_count(), 2);
        assert_eq!(router.tracker().snapshot().outages, 1);

        assert_eq!(router.shutdown_supervisor().await, Some(SupervisorExit::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_holds_for_grace_period_then_resumes_live_writes() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;

        store.set_available(false);
        router.route(Reading::new(1.99, 100)).await;
        store.set_available(true);
        store.script_probes([false, false]);

        // Probes at 20s and 40s fail, 60s succeeds, grace ends at 80s.
        sleep(Duration::from_secs(61)).await;
        assert_eq!(store.probe_count(), 3);
        assert!(!router.tracker().is_online());
        assert_eq!(
            router.route(Reading::new(2.00, 200)).await,
            RouteOutcome::Buffered(RecordNote::FallbackMode)
        );

        sleep(Duration::from_secs(17)).await;
        assert!(!router.tracker().is_online());

        sleep(Duration::from_secs(3)).await;
        assert!(router.tracker().is_online());
        assert_eq!(router.route(Reading::new(2.01, 300)).await, RouteOutcome::Stored);
        assert_eq!(store.readings().len(), 1);
        assert_eq!(router.tracker().snapshot().outages, 1);

        assert_eq!(router.shutdown_supervisor().await, Some(SupervisorExit::Recovered));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_outage_defers_session_to_supervisor() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::unavailable());
        let router = router(store.clone(), ConnectionTracker::new_offline(), dir.path());

        // Nothing routed yet, so no supervisor.
        assert!(!router.tracker().snapshot().supervisor_active);

        router.route(Reading::new(1.50, 5)).await;
        assert!(router.tracker().snapshot().supervisor_active);
        assert!(store.sessions().is_empty());

        store.set_available(true);
        sleep(Duration::from_secs(21)).await;
        let session = store.sessions()[0].id;
        assert!(!router.tracker().is_online());
        router.route(Reading::new(1.60, 6)).await;

        sleep(Duration::from_secs(20)).await;
        assert!(router.tracker().is_online());
        router.route(Reading::new(1.70, 7)).await;

        assert_eq!(
            buffered_lines(dir.path()),
            vec![
                "1.5,5,-1,Fallback mode".to_string(),
                format!("1.6,6,{},Fallback mode", session),
            ]
        );
        let rows = store.readings();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_id, session);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_insert_times_out_into_buffer() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;
        store.set_latency(Some(Duration::from_secs(30)));

        let outcome = router.route(Reading::new(3.3, 33)).await;
        assert_eq!(outcome, RouteOutcome::Buffered(RecordNote::FallbackModeOn));
        assert!(!router.tracker().is_online());

        router.shutdown_supervisor().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_line_becomes_sentinel_and_keeps_state() {
        let dir = tempdir().unwrap();
        let (store, router) = online_router(dir.path()).await;
        let session = store.sessions()[0].id;

        let outcome = router
            .handle(Ingested::Malformed {
                raw: "garbage".to_string(),
                reason: "missing field separator".to_string(),
            })
            .await;
        assert_eq!(outcome, RouteOutcome::Buffered(RecordNote::Malformed));
        assert!(router.tracker().is_online());

        router.handle(Ingested::Reading(Reading::new(2.0, 9))).await;

        assert_eq!(
            buffered_lines(dir.path()),
            vec![format!("-1,0,{},Malformed or unreadable data", session)]
        );
        assert_eq!(store.readings().len(), 1);
        let stats = router.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.buffered, 1);
        assert_eq!(stats.stored, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_buffer_counts_reading_as_lost() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "x").unwrap();
        let store = Arc::new(MemoryStore::unavailable());
        let router = router(store, ConnectionTracker::new_offline(), &blocker);

        assert_eq!(router.route(Reading::new(1.0, 1)).await, RouteOutcome::Lost);
        assert_eq!(router.stats().lost, 1);

        router.shutdown_supervisor().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readings_racing_recovery_do_not_reopen_the_outage() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let session = store.create_session(Utc::now()).await.unwrap();
        let router = PersistenceRouter::new(
            store.clone(),
            Arc::new(FallbackBuffer::new(dir.path())),
            Arc::new(ConnectionTracker::new_online(session)),
            PersistenceConfig {
                poll_interval: Duration::from_millis(1),
                grace_period: Duration::ZERO,
                store_timeout: Duration::from_secs(3),
            },
        );

        store.set_available(false);
        router.route(Reading::new(1.0, 0)).await;
        store.set_available(true);

        for i in 1..5_000u64 {
            router.route(Reading::new(1.0, i)).await;
            if i % 50 == 0 {
                tokio::task::yield_now().await;
            }
        }
        sleep(Duration::from_millis(100)).await;

        let snapshot = router.tracker().snapshot();
        assert_eq!(snapshot.state, ConnectionState::Online);
        assert_eq!(snapshot.outages, 1);
        assert!(!snapshot.supervisor_active);

        router.shutdown_supervisor().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_without_supervisor_is_noop() {
        let dir = tempdir().unwrap();
        let (_store, router) = online_router(dir.path()).await;
        assert_eq!(router.shutdown_supervisor().await, None);
    }
}
