//! Reconnection supervisor.
//!
//! One instance runs per outage. It polls the store's liveness probe at a
//! fixed interval, reconciles the session once the store answers, holds for
//! the grace period and then flips the tracker back online.

use crate::{ConnectionTracker, PersistenceConfig};
use chrono::Utc;
use primary_store::PrimaryStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// How a supervisor run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The store came back and live writes resumed.
    Recovered,
    /// The owning run shut down first.
    Cancelled,
}

pub struct ReconnectionSupervisor<S: PrimaryStore> {
    store: Arc<S>,
    tracker: Arc<ConnectionTracker>,
    config: PersistenceConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S: PrimaryStore> ReconnectionSupervisor<S> {
    pub fn new(
        store: Arc<S>,
        tracker: Arc<ConnectionTracker>,
        config: PersistenceConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<SupervisorExit> {
        tokio::spawn(self.run())
    }

    /// Poll until the store is back or shutdown is signalled.
    ///
    /// The caller must already hold the tracker's supervisor slot; it is
    /// released on every exit path.
    pub async fn run(mut self) -> SupervisorExit {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Reconnection supervisor started"
        );
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => {
                    return self.cancel();
                }
                _ = sleep(self.config.poll_interval) => {}
            }

            attempt += 1;
            debug!(attempt, "Probing primary store");
            match timeout(self.config.store_timeout, self.store.probe()).await {
                Ok(Ok(())) => info!(attempt, "Liveness probe succeeded"),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Liveness probe failed; staying offline");
                    continue;
                }
                Err(_) => {
                    warn!(attempt, "Liveness probe timed out; staying offline");
                    continue;
                }
            }

            if !self.reconcile_session().await {
                continue;
            }

            info!(
                grace_ms = self.config.grace_period.as_millis() as u64,
                "Store reachable; holding before resuming live writes"
            );
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => {
                    return self.cancel();
                }
                _ = sleep(self.config.grace_period) => {}
            }

            let outage = self.tracker.restore_online();
            info!(
                attempts = attempt,
                outage_ms = outage.map(|d| d.as_millis() as u64),
                session_id = self.tracker.session_id().map(|id| id.get()),
                "Primary store back online"
            );
            return SupervisorExit::Recovered;
        }
    }

    /// Make sure a session exists. Returns false when one had to be created
    /// and creation failed.
    async fn reconcile_session(&self) -> bool {
        if let Some(id) = self.tracker.session_id() {
            debug!(session_id = %id, "Session already open; nothing to reconcile");
            return true;
        }

        match timeout(self.config.store_timeout, self.store.create_session(Utc::now())).await {
            Ok(Ok(id)) => {
                self.tracker.adopt_session(id);
                info!(session_id = %id, "Created deferred session");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Deferred session creation failed; resuming polling");
                false
            }
            Err(_) => {
                warn!("Deferred session creation timed out; resuming polling");
                false
            }
        }
    }

    fn cancel(&self) -> SupervisorExit {
        self.tracker.release_supervisor();
        info!("Reconnection supervisor received shutdown signal");
        SupervisorExit::Cancelled
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
