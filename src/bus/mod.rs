//! Topic-addressed message bus.
//!
//! This module contains:
//! - `Message`: a `(topic, payload)` pair as it crosses the bus
//! - `Publish` trait: the seam servers publish through
//! - Framing for TCP transport
//! - `MessageQueue`: bounded queue with per-topic high-water-mark dropping
//! - Implementations: `BusPublisher`, `BusSubscriber`, `Relay`, `MockPublisher`
//!
//! Architecture:
//! ```text
//! ┌────────────┐  ingress  ┌─────────┐  egress   ┌─────────────┐
//! │BusPublisher│──────────▶│  Relay  │──────────▶│BusSubscriber│
//! └────────────┘           │ (fanout)│           │ (prefix     │
//! ┌────────────┐           │         │           │  filtering) │
//! │BusPublisher│──────────▶│         │──────────▶│             │
//! └────────────┘           └─────────┘           └─────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;

pub mod frame;
pub mod mock;
pub mod publisher;
pub mod queue;
pub mod relay;
pub mod subscriber;

pub use mock::MockPublisher;
pub use publisher::BusPublisher;
pub use queue::MessageQueue;
pub use relay::Relay;
pub use subscriber::{BusSubscriber, LatestMessages, DEFAULT_MAX_SKIP};

// ============================================================================
// Types
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Bus endpoint closed")]
    Closed,
}

/// A message as it crosses the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Bytes,
    pub payload: Bytes,
}

impl Message {
    pub fn new(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Interface for publishing onto the bus.
///
/// Implementations:
/// - `BusPublisher`: TCP connection to the relay ingress
/// - `MockPublisher`: in-memory capture for testing
#[async_trait]
pub trait Publish: Send + Sync {
    /// Queue a message for delivery.
    ///
    /// Delivery is best-effort and at-most-once. Returns once the message is
    /// queued, not once it is delivered.
    async fn publish(&self, topic: Bytes, payload: Bytes) -> Result<()>;
}
