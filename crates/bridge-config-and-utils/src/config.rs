//! Configuration management for the bridge.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default interval between liveness probes while offline.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20_000;
/// Default hold after a successful probe before live writes resume.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 20_000;
/// Default bound on any single primary-store operation.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 3_000;
/// Default capacity of the line queue between ingestor and router.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

const ENV_LOG_LEVEL: &str = "SENSOR_BRIDGE_LOG_LEVEL";
const ENV_STORE_PATH: &str = "SENSOR_BRIDGE_STORE_PATH";

/// Main bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// SQLite primary store. Defaults to `<base_dir>/readings.sqlite`.
    pub store_path: Option<PathBuf>,
    /// Create the primary store file when it does not exist. When false a
    /// missing file is treated as an unreachable store.
    pub create_store_if_missing: bool,
    /// Fallback buffer directory. Defaults to `<base_dir>/buffer`.
    pub buffer_dir: Option<PathBuf>,
    /// Liveness probe interval while offline, in milliseconds.
    pub poll_interval_ms: u64,
    /// Hold after a successful probe before resuming live writes, in milliseconds.
    pub grace_period_ms: u64,
    /// Upper bound on a single primary-store operation, in milliseconds.
    pub store_timeout_ms: u64,
    /// Capacity of the ingest queue.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            store_path: None,
            create_store_if_missing: true,
            buffer_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from `<base_dir>/config.json`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(non_empty) {
            self.log_level = level;
        }
        if let Some(path) = lookup(ENV_STORE_PATH).and_then(non_empty) {
            self.store_path = Some(PathBuf::from(path));
        }
    }

    /// Reject zero intervals and capacities.
    pub fn validate(&self) -> CoreResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.store_timeout_ms == 0 {
            return Err(CoreError::Config("store_timeout_ms must be > 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::Config("queue_capacity must be > 0".to_string()));
        }
        Ok(())
    }

    /// Resolved primary store path.
    pub fn store_path(&self, paths: &Paths) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| paths.store_file())
    }

    /// Resolved fallback buffer directory.
    pub fn buffer_dir(&self, paths: &Paths) -> PathBuf {
        self.buffer_dir.clone().unwrap_or_else(|| paths.buffer_dir())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.poll_interval(), Duration::from_secs(20));
        assert_eq!(config.grace_period(), Duration::from_secs(20));
        assert_eq!(config.store_timeout(), Duration::from_secs(3));
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.create_store_if_missing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_partial() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "poll_interval_ms": 500
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            buffer_dir: Some(dir.path().join("spool")),
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_config_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        let result = Config::load_from_file(&config_path);
        assert!(matches!(result, Err(CoreError::Json(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            ENV_LOG_LEVEL => Some("warn".to_string()),
            ENV_STORE_PATH => Some("/data/readings.sqlite".to_string()),
            _ => None,
        });
        assert_eq!(config.log_level, "warn");
        assert_eq!(
            config.store_path,
            Some(PathBuf::from("/data/readings.sqlite"))
        );
    }

    #[test]
    fn test_env_blank_values_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("   ".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_paths() {
        let paths = Paths::with_base_dir(PathBuf::from("/base"));
        let config = Config::default();
        assert_eq!(config.store_path(&paths), PathBuf::from("/base/readings.sqlite"));
        assert_eq!(config.buffer_dir(&paths), PathBuf::from("/base/buffer"));

        let config = Config {
            store_path: Some(PathBuf::from("/mnt/db.sqlite")),
            ..Config::default()
        };
        assert_eq!(config.store_path(&paths), PathBuf::from("/mnt/db.sqlite"));
    }
}
