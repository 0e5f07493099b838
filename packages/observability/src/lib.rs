//! # Observability
//!
//! Centralized logging layer for the sensor bridge.
//!
//! ## Design Philosophy
//!
//! Components are **log producers**. They call `observability::init()` once at
//! startup (the binary does this) and use standard `tracing` macros
//! everywhere else. They have zero knowledge of where the lines end up.
//!
//! ## Outputs
//!
//! - A compact human-readable stream on stderr, so an operator watching the
//!   console can follow every offline entry, poll attempt and recovery.
//! - An optional JSONL file (one object per line) that survives the process
//!   and lets an operator reconstruct outage durations after the fact:
//!
//! ```text
//! tail -f ~/.sensor-bridge/logs/bridge.jsonl | jq
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "sensor-bridge".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/bridge.jsonl".into()),
//!     ..Default::default()
//! });
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{AppendLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. No file layer is installed when `None`.
    pub log_path: Option<PathBuf>,

    /// Emit the compact stderr stream.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// A log file that cannot be opened downgrades to stderr-only output and the
/// failure is reported once the subscriber is installed. Calling this twice
/// is harmless: the second global subscriber install is ignored.
pub fn init_with_config(config: LogConfig) {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let mut file_error = None;
    let json_layer = match config.log_path.as_ref() {
        Some(path) => match AppendLogWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                    .with_filter(filter()),
            ),
            Err(err) => {
                file_error = Some((path.clone(), err));
                None
            }
        },
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (file_error, config.log_path.as_ref()) {
        (Some((path, err)), _) => tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "log file unavailable, logging to stderr only"
        ),
        (None, Some(path)) => tracing::debug!(
            log_path = %path.display(),
            "observability initialized"
        ),
        (None, None) => {}
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.also_stderr);
    }

    #[test]
    fn init_twice_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            service_name: "test".into(),
            log_path: Some(dir.path().join("logs").join("test.jsonl")),
            also_stderr: false,
            ..Default::default()
        };
        init_with_config(config.clone());
        init_with_config(config);
    }
}
