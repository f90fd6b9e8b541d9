//! Retry utilities: backoff builders for bus reconnection and startup.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Delay used once a backoff sequence is exhausted.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Backoff for bus endpoint reconnection.
///
/// - Min delay: 100ms
/// - Max delay: 2s
/// - Max attempts: 20 (callers fall back to `MAX_RECONNECT_DELAY` afterwards)
/// - Jitter enabled
pub fn reconnect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(MAX_RECONNECT_DELAY)
        .with_max_times(20)
        .with_jitter()
}

/// Backoff for one-shot startup operations such as binding the relay.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max retries: 29 (30 attempts in total)
/// - Jitter enabled
pub fn startup_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(29)
        .with_jitter()
}

/// Endless reconnect delays: the backoff sequence, then a fixed ceiling.
pub struct ReconnectDelays {
    inner: ExponentialBackoff,
}

impl ReconnectDelays {
    pub fn new() -> Self {
        Self {
            inner: reconnect_backoff().build(),
        }
    }

    /// Next delay to wait before reconnecting.
    pub fn next_delay(&mut self) -> Duration {
        self.inner.next().unwrap_or(MAX_RECONNECT_DELAY)
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.inner = reconnect_backoff().build();
    }
}

impl Default for ReconnectDelays {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delays_never_exceed_ceiling() {
        let mut delays = ReconnectDelays::new();
        for _ in 0..50 {
            // Jitter may add up to one extra delay on top of the max.
            assert!(delays.next_delay() <= MAX_RECONNECT_DELAY * 2);
        }
    }

    #[test]
    fn test_reconnect_delays_fall_back_after_exhaustion() {
        let mut delays = ReconnectDelays::new();
        for _ in 0..20 {
            delays.next_delay();
        }
        assert_eq!(delays.next_delay(), MAX_RECONNECT_DELAY);
    }
}
