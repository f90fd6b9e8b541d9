//! Worker heartbeats.
//!
//! Workers publish a `Heartbeat` on `/heartbeat/<name>/` every second. The
//! supervisor keeps the receive instant per name and feeds it to the
//! watchdog, so worker and supervisor clocks never have to agree.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use prost::Message as _;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::{BusSubscriber, Publish};
use crate::config::DAEMON_ENV_VAR;
use crate::proto::Heartbeat;
use crate::topics::{heartbeat_name, heartbeat_topic, HEARTBEAT_PREFIX};
use crate::utils::time::epoch_secs;

/// Interval between heartbeats of one worker.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Last heartbeat receipt per worker name.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatBoard {
    seen: Arc<RwLock<HashMap<String, Instant>>>,
}

impl HeartbeatBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        let mut seen = self.seen.write().unwrap_or_else(|e| e.into_inner());
        seen.insert(name.to_string(), Instant::now());
    }

    pub fn last(&self, name: &str) -> Option<Instant> {
        let seen = self.seen.read().unwrap_or_else(|e| e.into_inner());
        seen.get(name).copied()
    }

    /// Record heartbeats arriving on `subscriber` until it closes.
    pub async fn listen(&self, subscriber: BusSubscriber) {
        subscriber.subscribe(HEARTBEAT_PREFIX);
        while let Ok(message) = subscriber.recv().await {
            match heartbeat_name(&message.topic) {
                Some(name) => self.record(name),
                None => debug!(
                    topic = %String::from_utf8_lossy(&message.topic),
                    "Ignoring malformed heartbeat topic"
                ),
            }
        }
    }
}

/// This worker's name as assigned by the supervisor, if supervised.
pub fn daemon_name() -> Option<String> {
    std::env::var(DAEMON_ENV_VAR).ok().filter(|n| !n.is_empty())
}

/// Publish heartbeats for `name` until the task is aborted.
pub fn spawn_heartbeat(publisher: Arc<dyn Publish>, name: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let topic = heartbeat_topic(&name);
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            let beat = Heartbeat {
                name: name.clone(),
                timestamp: epoch_secs(),
            };
            if let Err(e) = publisher
                .publish(topic.clone(), beat.encode_to_vec().into())
                .await
            {
                warn!(name = %name, error = %e, "Failed to publish heartbeat");
            }
        }
    })
}
