//! Core types, configuration, and utilities for the sensor bridge.

mod config;
mod error;
mod logging;
mod model;
mod paths;

pub use config::{
    Config, DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_LEVEL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_STORE_TIMEOUT_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, SERVICE_NAME};
pub use model::{
    BufferedRecord, Ingested, Reading, RecordNote, SessionId, SENTINEL_SESSION_ID, SENTINEL_VALUE,
};
pub use paths::Paths;
