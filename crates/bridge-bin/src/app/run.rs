//! Acquisition run: session lifecycle around one ingest window.

use bridge_config_and_utils::{RecordNote, SessionId};
use chrono::Utc;
use fallback_buffer::FallbackBuffer;
use persistence_router::{
    spawn_worker, ConnectionTracker, PersistenceConfig, PersistenceRouter, RouterStats,
    SupervisorExit,
};
use primary_store::PrimaryStore;
use serial_ingestor::{
    AcquisitionClock, IngestEnd, IngestSummary, Link, LinkError, LinkResult, SerialIngestor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Errors that end a run early.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub persistence: PersistenceConfig,
    pub queue_capacity: usize,
    /// How long to acquire for, measured from link open.
    pub window: Duration,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Active session at shutdown (possibly created mid-run).
    pub session_id: Option<SessionId>,
    pub session_closed: bool,
    pub ingest: IngestSummary,
    pub routed: RouterStats,
    pub outages: u32,
}

/// Drive one acquisition: create the session, open the link via `open`,
/// ingest for the window, drain, close the session and stop the supervisor.
///
/// Only a link failure ends the run with an error. Store and buffer
/// failures are absorbed by the router.
pub async fn run_acquisition<S, F>(
    store: Arc<S>,
    buffer: Arc<FallbackBuffer>,
    options: RunOptions,
    open: F,
) -> Result<RunReport, RunError>
where
    S: PrimaryStore,
    F: FnOnce() -> LinkResult<Link>,
{
    let store_timeout = options.persistence.store_timeout;

    let tracker = match timeout(store_timeout, store.create_session(Utc::now())).await {
        Ok(Ok(id)) => {
            info!(session_id = %id, "Session created");
            ConnectionTracker::new_online(id)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Session creation failed; starting in fallback mode");
            ConnectionTracker::new_offline()
        }
        Err(_) => {
            warn!(
                timeout_ms = store_timeout.as_millis() as u64,
                "Session creation timed out; starting in fallback mode"
            );
            ConnectionTracker::new_offline()
        }
    };
    let started_offline = !tracker.is_online();

    let router = Arc::new(PersistenceRouter::new(
        store.clone(),
        buffer,
        Arc::new(tracker),
        options.persistence.clone(),
    ));
    if started_offline {
        router.buffer_sentinel(RecordNote::StoreUnavailableAtStartup);
    }

    let link = match open() {
        Ok(link) => link,
        Err(e) => {
            error!(error = %e, "Cannot open link; aborting run");
            router.shutdown_supervisor().await;
            return Err(RunError::Link(e));
        }
    };
    let clock = AcquisitionClock::start();
    info!(link = link.name(), window_ms = options.window.as_millis() as u64, "Acquisition started");

    let (queue_tx, queue_rx) = mpsc::channel(options.queue_capacity);
    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = spawn_worker(router.clone(), queue_rx);
    let ingestor = SerialIngestor::new(clock, queue_tx);
    let reader = link.into_reader();
    let ingest = tokio::spawn(async move { ingestor.run(reader, stop_rx).await });

    sleep(options.window).await;
    stop_tx.send_replace(true);

    // The ingestor owns the only sender; once it returns the worker drains
    // what is left in the queue and exits.
    let ingest = ingest.await.map_err(|e| RunError::Task(e.to_string()))?;
    worker.await.map_err(|e| RunError::Task(e.to_string()))?;

    let session_closed = close_session(&router).await;
    let supervisor = router.shutdown_supervisor().await;
    if supervisor == Some(SupervisorExit::Cancelled) {
        info!("Run ended before the primary store recovered");
    }

    let snapshot = router.tracker().snapshot();
    let report = RunReport {
        session_id: snapshot.session_id,
        session_closed,
        ingest,
        routed: router.stats(),
        outages: snapshot.outages,
    };
    info!(
        session_id = report.session_id.map(|id| id.get()),
        session_closed = report.session_closed,
        lines = report.ingest.lines,
        stored = report.routed.stored,
        buffered = report.routed.buffered,
        malformed = report.routed.malformed,
        lost = report.routed.lost,
        outages = report.outages,
        link_end = ?report.ingest.end,
        elapsed_ms = clock.elapsed_ms(),
        "Acquisition finished"
    );
    if report.ingest.end == IngestEnd::ReadError {
        warn!("Link failed before the window elapsed");
    }

    Ok(report)
}

/// Close the active session if the store is currently reachable.
async fn close_session<S: PrimaryStore>(router: &PersistenceRouter<S>) -> bool {
    let snapshot = router.tracker().snapshot();
    let session_id = match snapshot.session_id {
        Some(id) if router.tracker().is_online() => id,
        Some(id) => {
            warn!(session_id = %id, "Store offline at shutdown; session left open");
            return false;
        }
        None => {
            info!("No session to close");
            return false;
        }
    };

    let store_timeout = router.config().store_timeout;
    let result = timeout(
        store_timeout,
        router.store().close_session(session_id, Utc::now()),
    )
    .await;
    match result {
        Ok(Ok(())) => {
            info!(session_id = %session_id, "Session closed");
            true
        }
        Ok(Err(e)) => {
            warn!(session_id = %session_id, error = %e, "Failed to close session");
            router.buffer_sentinel(RecordNote::SessionCloseFailed);
            false
        }
        Err(_) => {
            warn!(session_id = %session_id, "Closing session timed out");
            router.buffer_sentinel(RecordNote::SessionCloseFailed);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_config_and_utils::Reading;
    use chrono::DateTime;
    use primary_store::{MemoryStore, StoreError, StoreResult};
    use std::path::Path;
    use tempfile::tempdir;

    fn options(window: Duration) -> RunOptions {
        RunOptions {
            persistence: PersistenceConfig {
                poll_interval: Duration::from_secs(20),
                grace_period: Duration::from_secs(20),
                store_timeout: Duration::from_secs(3),
            },
            queue_capacity: 16,
            window,
        }
    }

    fn replay(data: &'static [u8]) -> impl FnOnce() -> LinkResult<Link> {
        move || Ok(Link::from_reader("replay", data))
    }

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

    /// Accepts everything except closing a session.
    struct CloseFails(MemoryStore);

    #[async_trait]
    impl PrimaryStore for CloseFails {
        async fn create_session(&self, started_at: DateTime<Utc>) -> StoreResult<SessionId> {
            self.0.create_session(started_at).await
        }

        async fn close_session(&self, _id: SessionId, _ended_at: DateTime<Utc>) -> StoreResult<()> {
            Err(StoreError::Connection("connection reset".to_string()))
        }

        async fn insert_reading(&self, reading: Reading, session_id: SessionId) -> StoreResult<()> {
            self.0.insert_reading(reading, session_id).await
        }

        async fn probe(&self) -> StoreResult<()> {
            self.0.probe().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn online_run_stores_readings_and_closes_session() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let buffer = Arc::new(FallbackBuffer::new(dir.path()));

        let report = run_acquisition(
            store.clone(),
            buffer,
            options(Duration::from_secs(1)),
            replay(b"ADC: 2050, Voltage: 2.05\ngarbage\nADC: 2100, Voltage: 2.10\n"),
        )
        .await
        .unwrap();

        let session = store.sessions()[0].clone();
        assert_eq!(report.session_id, Some(session.id));
        assert!(report.session_closed);
        assert!(store.session(session.id).unwrap().ended_at.is_some());

        let values: Vec<f64> = store.readings().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.05, 2.10]);
        assert_eq!(
            buffered_lines(dir.path()),
            vec![format!("-1,0,{},Malformed or unreadable data", session.id)]
        );
        assert_eq!(report.routed.stored, 2);
        assert_eq!(report.routed.malformed, 1);
        assert_eq!(report.outages, 0);
        assert_eq!(report.ingest.end, IngestEnd::EndOfStream);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_buffers_everything_with_sentinel_session() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::unavailable());
        let buffer = Arc::new(FallbackBuffer::new(dir.path()));

        let report = run_acquisition(
            store.clone(),
            buffer,
            options(Duration::from_secs(5)),
            replay(b"ADC: 1990, Voltage: 1.99\nADC: 2100, Voltage: 2.10\n"),
        )
        .await
        .unwrap();

        assert_eq!(
            buffered_lines(dir.path()),
            vec![
                "-1,0,-1,Error on SQL Server connection".to_string(),
                "1.99,0,-1,Fallback mode".to_string(),
                "2.10,0,-1,Fallback mode".to_string(),
            ]
        );
        assert!(store.sessions().is_empty());
        assert_eq!(report.session_id, None);
        assert!(!report.session_closed);
        assert_eq!(report.outages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_recovering_mid_run_gets_deferred_session() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::unavailable());
        let buffer = Arc::new(FallbackBuffer::new(dir.path()));

        let flip = store.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(10)).await;
            flip.set_available(true);
        });

        let report = run_acquisition(
            store.clone(),
            buffer,
            options(Duration::from_secs(60)),
            replay(b"ADC: 1500, Voltage: 1.50\n"),
        )
        .await
        .unwrap();

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(report.session_id, Some(sessions[0].id));
        assert!(report.session_closed);
        assert!(store.session(sessions[0].id).unwrap().ended_at.is_some());
        assert_eq!(report.outages, 1);
        assert!(store.readings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn link_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let buffer = Arc::new(FallbackBuffer::new(dir.path()));

        let result = run_acquisition(store.clone(), buffer, options(Duration::from_secs(1)), || {
            Err(LinkError::UnsupportedBaud(31337))
        })
        .await;

        assert!(matches!(result, Err(RunError::Link(_))));
        assert_eq!(store.sessions().len(), 1);
        assert!(store.readings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_failure_is_recorded_as_sentinel() {
        let dir = tempdir().unwrap();
        let store = Arc::new(CloseFails(MemoryStore::new()));
        let buffer = Arc::new(FallbackBuffer::new(dir.path()));

        let report = run_acquisition(
            store.clone(),
            buffer,
            options(Duration::from_secs(1)),
            replay(b"ADC: 10, Voltage: 0.10\n"),
        )
        .await
        .unwrap();

        let session = report.session_id.unwrap();
        assert!(!report.session_closed);
        assert_eq!(store.0.readings().len(), 1);
        assert_eq!(
            buffered_lines(dir.path()),
            vec![format!("-1,0,{},Error updating log end time", session)]
        );
    }
}
