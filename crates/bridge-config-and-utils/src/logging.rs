//! Logging initialization for the bridge.
//!
//! Thin wrapper over the observability crate: compact narration on stderr
//! plus a JSONL trail, by default at `~/.sensor-bridge/logs/bridge.jsonl`.

use std::path::Path;

/// Service name stamped on every JSONL line.
pub const SERVICE_NAME: &str = "sensor-bridge";

/// Initialize the logging system.
///
/// # Arguments
///
/// * `level` - Default log level (trace, debug, info, warn, error); `RUST_LOG` wins
/// * `log_path` - JSONL file to append to, or `None` for stderr only
///
/// # Example
///
/// ```ignore
/// init_logging("info", Some(&paths.log_file()));
/// tracing::info!("bridge started");
/// ```
pub fn init_logging(level: &str, log_path: Option<&Path>) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: log_path.map(Path::to_path_buf),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
