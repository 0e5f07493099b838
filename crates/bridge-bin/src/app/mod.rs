//! Application wiring.

mod prompt;
mod run;

pub use prompt::{prompt_duration_ms, prompt_port};
pub use run::{run_acquisition, RunError, RunOptions, RunReport};

use bridge_config_and_utils::{Config, Paths};
use fallback_buffer::FallbackBuffer;
use persistence_router::PersistenceConfig;
use primary_store::{SqliteStore, SqliteStoreOptions};
use serial_ingestor::{open_link, LinkSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run one acquisition against the configured SQLite store and buffer.
pub async fn run_bridge(
    config: Config,
    paths: Paths,
    port: &str,
    window_ms: u64,
) -> Result<RunReport, RunError> {
    let store_path = config.store_path(&paths);
    let buffer_dir = config.buffer_dir(&paths);
    info!(
        port,
        window_ms,
        store = %store_path.display(),
        buffer = %buffer_dir.display(),
        "Starting acquisition"
    );

    let store = Arc::new(SqliteStore::new(
        store_path,
        SqliteStoreOptions {
            create_if_missing: config.create_store_if_missing,
            timeout: config.store_timeout(),
        },
    ));
    let buffer = Arc::new(FallbackBuffer::new(buffer_dir));
    let options = RunOptions {
        persistence: PersistenceConfig::from(&config),
        queue_capacity: config.queue_capacity,
        window: Duration::from_millis(window_ms),
    };

    run_acquisition(store, buffer, options, || {
        open_link(port, LinkSettings::default())
    })
    .await
}
