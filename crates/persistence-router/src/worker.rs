//! Queue consumer that feeds the router.

use crate::PersistenceRouter;
use bridge_config_and_utils::Ingested;
use primary_store::PrimaryStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn the router worker.
///
/// Items are routed one at a time in arrival order. The worker ends once
/// every sender is dropped and the queue is drained, returning how many
/// items it handled.
pub fn spawn_worker<S: PrimaryStore>(
    router: Arc<PersistenceRouter<S>>,
    mut queue: mpsc::Receiver<Ingested>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut handled: u64 = 0;
        while let Some(item) = queue.recv().await {
            router.handle(item).await;
            handled += 1;
        }
        debug!(handled, "Router worker drained its queue");
        handled
    })
}
