//! Wall-clock helpers.
//!
//! Recorded timestamps are seconds since the Unix epoch as `f64`.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Current wall-clock time in seconds since the Unix epoch.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Epoch-seconds clock that advances with the tokio timer.
///
/// Anchored to the system clock once at construction and monotonic
/// afterwards, so playback schedules are immune to wall-clock jumps and
/// follow paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    origin_secs: f64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_secs: epoch_secs(),
        }
    }

    /// Current time in epoch seconds.
    pub fn now(&self) -> f64 {
        self.origin_secs + self.origin.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
