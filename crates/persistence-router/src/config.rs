//! Router and supervisor timing.

use bridge_config_and_utils::Config;
use std::time::Duration;

/// Timing knobs shared by the router and the reconnection supervisor.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Fixed wait between liveness probes while offline.
    pub poll_interval: Duration,
    /// Hold after reconciliation before live writes resume.
    pub grace_period: Duration,
    /// Upper bound on any single store call made by the router or supervisor.
    pub store_timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            grace_period: Duration::from_secs(20),
            store_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for PersistenceConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            grace_period: config.grace_period(),
            store_timeout: config.store_timeout(),
        }
    }
}
