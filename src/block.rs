//! Self-expiring "block live production" latch.
//!
//! While replay is enabled it tells live producers to stand down every few
//! seconds. Each signal holds the gate shut for a fixed window, so producers
//! resume on their own once replay stops sending.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// How long one block signal suppresses production.
pub const BLOCK_DURATION: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct BlockGate {
    duration: Duration,
    blocked_until: Mutex<Option<Instant>>,
}

impl BlockGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            blocked_until: Mutex::new(None),
        }
    }

    /// Suppress production for one block window from now.
    pub fn block(&self) {
        let until = Instant::now() + self.duration;
        *self.lock() = Some(until);
    }

    pub fn is_blocked(&self) -> bool {
        self.lock().is_some_and(|until| Instant::now() < until)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.blocked_until.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for BlockGate {
    fn default() -> Self {
        Self::new(BLOCK_DURATION)
    }
}
