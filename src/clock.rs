//! Clock worker: broadcasts wall-clock time once a second.
//!
//! Goes quiet while blocked so a replayed session's own clock messages are
//! the only ones on the bus.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message as _;
use tracing::{debug, info, warn};

use crate::block::BlockGate;
use crate::bus::{BusSubscriber, Publish, Result};
use crate::proto::Time;
use crate::topics::{ServiceTopics, TIME_TOPIC};
use crate::utils::time::epoch_secs;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct ClockServer {
    publisher: Arc<dyn Publish>,
    topics: ServiceTopics,
    gate: BlockGate,
}

impl ClockServer {
    pub fn new(publisher: Arc<dyn Publish>, topics: ServiceTopics) -> Self {
        Self {
            publisher,
            topics,
            gate: BlockGate::default(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.gate.is_blocked()
    }

    pub async fn run<F>(&self, subscriber: &BusSubscriber, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(service = %self.topics.service(), "Clock server started");
        tokio::select! {
            r = async { tokio::try_join!(self.command_loop(subscriber), self.tick_loop()) } => r.map(|_| ()),
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }

    pub async fn command_loop(&self, subscriber: &BusSubscriber) -> Result<()> {
        subscriber.subscribe(self.topics.inbox());
        let block = self.topics.block();
        loop {
            let latest = subscriber.receive_latest(&[]).await?;
            if latest.contains_key(&block) {
                debug!("Blocked by replay");
                self.gate.block();
            }
        }
    }

    pub async fn tick_loop(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if self.gate.is_blocked() {
                debug!("Clock blocked, skipping tick");
                continue;
            }
            let time = Time {
                seconds: epoch_secs(),
            };
            if let Err(e) = self
                .publisher
                .publish(Bytes::from_static(TIME_TOPIC), time.encode_to_vec().into())
                .await
            {
                warn!(error = %e, "Failed to publish time");
            }
        }
    }
}
