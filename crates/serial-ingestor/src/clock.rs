//! Acquisition timer.

use std::time::Duration;
use tokio::time::Instant;

/// Monotonic timer started when the link opens.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionClock {
    started: Instant,
}

impl AcquisitionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whole milliseconds since start.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
