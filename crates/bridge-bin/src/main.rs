//! Sensor Bridge - streams sensor lines from a device link into the primary
//! store, buffering locally while the store is unreachable.

mod app;

use std::path::PathBuf;
use std::time::Duration;

use bridge_config_and_utils::{init_logging, Config, Paths};
use clap::Parser;
use serial_ingestor::STDIN_PORT;

/// Sensor bridge command-line interface.
#[derive(Parser)]
#[command(name = "sensor-bridge")]
#[command(about = "Bridge a serial sensor link to a durable store")]
#[command(version)]
struct Cli {
    /// Device to read from (e.g. /dev/ttyUSB0), or "-" for standard input.
    /// Prompted for when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Acquisition window in milliseconds. Prompted for when omitted.
    #[arg(short, long)]
    duration_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, logs, store, buffer). Defaults to ~/.sensor-bridge
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// SQLite primary store file
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Fallback buffer directory
    #[arg(long)]
    buffer_dir: Option<PathBuf>,
}

/// How long exit waits for a standard-input read that is still blocked.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(cli));
    // Stdin reads run on the blocking pool and cannot be cancelled.
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(store_path) = cli.store_path {
        config.store_path = Some(store_path);
    }
    if let Some(buffer_dir) = cli.buffer_dir {
        config.buffer_dir = Some(buffer_dir);
    }

    paths.ensure_dirs()?;
    init_logging(&config.log_level, Some(&paths.log_file()));

    let port = match cli.port {
        Some(port) => port,
        None => app::prompt_port()?,
    };
    let window = match cli.duration_ms {
        Some(ms) => ms,
        None if port == STDIN_PORT => {
            return Err("--duration-ms is required when reading from standard input".into());
        }
        None => app::prompt_duration_ms()?,
    };

    app::run_bridge(config, paths, &port, window).await?;
    Ok(())
}
