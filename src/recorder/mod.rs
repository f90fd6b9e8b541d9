//! Record engine: captures every bus message into session shards.
//!
//! Start and stop arrive as bus messages on `/<service>/in/start/` and
//! `/<service>/in/stop/`. The command message itself is recorded before it
//! is acted on, so a stop is the last entry of the session it ends.

pub mod session;
pub mod shard;

pub use session::LogRecorder;
pub use shard::{ShardError, ShardWriter};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message as _;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::bus::{BusSubscriber, Message, Publish, Result};
use crate::config::{RecorderConfig, StorageConfig};
use crate::error::ServerError;
use crate::proto::{LogEntry, LoggerStatus};
use crate::topics::{ServiceTopics, SERVER_EXCEPTION_TOPIC};
use crate::utils::time::MonotonicClock;

/// Record server: recording loop plus periodic status.
pub struct RecordServer {
    publisher: Arc<dyn Publish>,
    recorder: Mutex<LogRecorder>,
    topics: ServiceTopics,
    status_interval: Duration,
    clock: MonotonicClock,
}

impl RecordServer {
    pub fn new(publisher: Arc<dyn Publish>, recorder: LogRecorder, topics: ServiceTopics) -> Self {
        Self {
            publisher,
            recorder: Mutex::new(recorder),
            topics,
            status_interval: Duration::from_secs(1),
            clock: MonotonicClock::new(),
        }
    }

    pub fn from_config(
        publisher: Arc<dyn Publish>,
        storage: &StorageConfig,
        config: &RecorderConfig,
    ) -> Self {
        let recorder = LogRecorder::new(
            &storage.log_root,
            storage.shard_max_count,
            storage.shard_max_size,
        );
        Self::new(publisher, recorder, ServiceTopics::new(&config.service))
            .with_status_interval(Duration::from_millis(config.status_interval_ms))
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Id of the session being recorded.
    pub async fn session_id(&self) -> Option<String> {
        self.recorder.lock().await.session_id().map(str::to_string)
    }

    /// Record and report status until `shutdown` resolves or the bus closes,
    /// then seal the open session.
    pub async fn run<F>(&self, subscriber: &BusSubscriber, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(service = %self.topics.service(), "Record server started");

        let result = tokio::select! {
            r = async { tokio::try_join!(self.record_loop(subscriber), self.status_loop()) } => r.map(|_| ()),
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        self.recorder.lock().await.stop_session();
        result
    }

    /// Record every message from `subscriber`.
    pub async fn record_loop(&self, subscriber: &BusSubscriber) -> Result<()> {
        subscriber.subscribe(Bytes::new());
        loop {
            let message = subscriber.recv().await?;
            self.handle(message).await;
        }
    }

    /// Record one message, then apply it if it is a command.
    pub async fn handle(&self, message: Message) {
        let entry = LogEntry {
            log_mono_time: self.clock.now(),
            topic: message.topic,
            data: message.payload,
        };

        let mut recorder = self.recorder.lock().await;
        if let Err(e) = recorder.write(&entry) {
            error!(
                topic = %String::from_utf8_lossy(&entry.topic),
                error = %e,
                "Failed to record entry"
            );
        }

        let changed = if entry.topic == self.topics.command("stop") {
            recorder.stop_session();
            true
        } else if entry.topic == self.topics.command("start") {
            if let Err(e) = recorder.new_session() {
                error!(error = %e, "Failed to start recording session");
                drop(recorder);
                self.publish_error(ServerError::internal(format!(
                    "failed to start session: {}",
                    e
                )))
                .await;
                return;
            }
            true
        } else {
            false
        };

        if changed {
            let status = status_of(&recorder);
            drop(recorder);
            self.publish_status(status).await;
        }
    }

    /// Publish recorder status on a fixed interval.
    pub async fn status_loop(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.status_interval);
        loop {
            ticker.tick().await;
            let status = status_of(&*self.recorder.lock().await);
            self.publish_status(status).await;
        }
    }

    async fn publish_status(&self, status: LoggerStatus) {
        if let Err(e) = self
            .publisher
            .publish(self.topics.status(), status.encode_to_vec().into())
            .await
        {
            warn!(error = %e, "Failed to publish recorder status");
        }
    }

    async fn publish_error(&self, err: ServerError) {
        let payload = err.status_response().encode_to_vec();
        if let Err(e) = self
            .publisher
            .publish(Bytes::from_static(SERVER_EXCEPTION_TOPIC), payload.into())
            .await
        {
            warn!(error = %e, "Failed to publish server exception");
        }
    }
}

fn status_of(recorder: &LogRecorder) -> LoggerStatus {
    LoggerStatus {
        recording: recorder.is_recording(),
        session_id: recorder.session_id().unwrap_or_default().to_string(),
    }
}
