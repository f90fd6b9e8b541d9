//! Mock publisher implementation for testing.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{BusError, Message, Publish, Result};
use crate::topics::topic_matches;

/// A message captured by [`MockPublisher`] with the instant it was published.
#[derive(Debug, Clone)]
pub struct Published {
    pub message: Message,
    pub at: Instant,
}

/// Mock publisher for testing.
#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<Published>>,
    fail_on_publish: RwLock<bool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// All captured messages in publish order.
    pub async fn published(&self) -> Vec<Published> {
        self.published.read().await.clone()
    }

    /// Captured messages whose topic starts with `prefix`.
    pub async fn published_under(&self, prefix: &[u8]) -> Vec<Published> {
        self.published
            .read()
            .await
            .iter()
            .filter(|p| topic_matches(&p.message.topic, prefix))
            .cloned()
            .collect()
    }

    pub async fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl Publish for MockPublisher {
    async fn publish(&self, topic: Bytes, payload: Bytes) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Closed);
        }
        self.published.write().await.push(Published {
            message: Message { topic, payload },
            at: Instant::now(),
        });
        Ok(())
    }
}
