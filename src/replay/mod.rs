//! Replay engine: re-publishes a recorded session with its original timing.
//!
//! Five loops share one [`Replayer`]:
//! - commands: coalesced reads of `/<service>/in/*` plus recorder status
//! - playback: publishes entries when they fall due
//! - status: `/<service>/status/` every 200 ms (slower while disabled)
//! - list: `/<service>/list/` every 5 s while enabled
//! - blocker: `/<name>/in/block/` to each blocked service every 5 s while enabled

pub mod catalog;
pub mod command;
pub mod cursor;
pub mod replayer;

pub use catalog::{SessionCatalog, SessionInfo};
pub use command::ReplayCommand;
pub use cursor::LogCursor;
pub use replayer::{Playback, Replayer};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message as _;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::bus::{BusSubscriber, Publish, Result};
use crate::config::{RecorderConfig, ReplayConfig, StorageConfig};
use crate::error::ServerError;
use crate::proto::{LoggerStatus, ReplayerStatus};
use crate::topics::{ServiceTopics, SERVER_EXCEPTION_TOPIC};
use crate::utils::time::MonotonicClock;

pub const STATUS_INTERVAL: Duration = Duration::from_millis(200);
pub const DISABLED_STATUS_BACKOFF: Duration = Duration::from_secs(2);
pub const LIST_INTERVAL: Duration = Duration::from_secs(5);
pub const BLOCK_INTERVAL: Duration = Duration::from_secs(5);
const DISABLED_POLL: Duration = Duration::from_secs(1);

/// Replay server.
pub struct ReplayServer {
    publisher: Arc<dyn Publish>,
    state: Mutex<Replayer>,
    changes: watch::Sender<u64>,
    topics: ServiceTopics,
    recorder_topics: ServiceTopics,
    block_list: Vec<ServiceTopics>,
    excluded: Vec<Bytes>,
    no_drop: Vec<Bytes>,
    clock: MonotonicClock,
}

impl ReplayServer {
    pub fn new(publisher: Arc<dyn Publish>, catalog: SessionCatalog, topics: ServiceTopics) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            publisher,
            state: Mutex::new(Replayer::new(catalog)),
            changes,
            topics,
            recorder_topics: ServiceTopics::new(crate::topics::RECORDER_SERVICE),
            block_list: Vec::new(),
            excluded: Vec::new(),
            no_drop: Vec::new(),
            clock: MonotonicClock::new(),
        }
    }

    pub fn from_config(
        publisher: Arc<dyn Publish>,
        storage: &StorageConfig,
        recorder: &RecorderConfig,
        config: &ReplayConfig,
    ) -> Self {
        Self::new(
            publisher,
            SessionCatalog::new(&storage.log_root),
            ServiceTopics::new(&config.service),
        )
        .with_recorder(ServiceTopics::new(&recorder.service))
        .with_block_list(config.block_list.iter().map(String::as_str))
        .with_excluded_prefixes(config.excluded_prefixes.iter().map(|p| Bytes::from(p.clone())))
        .with_no_drop(config.no_drop_topics.iter().map(|t| Bytes::from(t.clone())))
    }

    /// Recorder whose open session must not be loaded.
    pub fn with_recorder(mut self, recorder: ServiceTopics) -> Self {
        self.recorder_topics = recorder;
        self
    }

    pub fn with_block_list<'a>(mut self, services: impl IntoIterator<Item = &'a str>) -> Self {
        self.block_list = services.into_iter().map(ServiceTopics::new).collect();
        self
    }

    pub fn with_excluded_prefixes(mut self, prefixes: impl IntoIterator<Item = Bytes>) -> Self {
        self.excluded = prefixes.into_iter().collect();
        self
    }

    pub fn with_no_drop(mut self, topics: impl IntoIterator<Item = Bytes>) -> Self {
        self.no_drop = topics.into_iter().collect();
        self
    }

    pub fn topics(&self) -> &ServiceTopics {
        &self.topics
    }

    /// Current status snapshot.
    pub async fn status(&self) -> ReplayerStatus {
        self.state.lock().await.status(self.clock.now())
    }

    /// Run every loop until `shutdown` resolves or the bus closes.
    pub async fn run<F>(&self, subscriber: &BusSubscriber, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(service = %self.topics.service(), "Replay server started");
        tokio::select! {
            r = async {
                tokio::try_join!(
                    self.command_loop(subscriber),
                    self.playback_loop(),
                    self.status_loop(),
                    self.list_loop(),
                    self.blocker_loop(),
                )
            } => r.map(|_| ()),
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Apply command batches from `subscriber`.
    pub async fn command_loop(&self, subscriber: &BusSubscriber) -> Result<()> {
        subscriber.subscribe(self.topics.inbox());
        subscriber.subscribe(self.recorder_topics.status());
        let no_drop: Vec<&[u8]> = self.no_drop.iter().map(|t| &t[..]).collect();

        loop {
            let latest = subscriber.receive_latest(&no_drop).await?;
            let errors = self.handle_batch(&latest).await;
            for err in errors {
                self.publish_error(err).await;
            }
        }
    }

    /// Apply one coalesced batch; returns the domain errors it produced.
    pub async fn handle_batch(&self, latest: &crate::bus::LatestMessages) -> Vec<ServerError> {
        let mut errors = Vec::new();
        let mut state = self.state.lock().await;

        if let Some(payload) = latest.get(&self.recorder_topics.status()) {
            match LoggerStatus::decode(payload.clone()) {
                Ok(status) => state.set_recording(status.recording.then_some(status.session_id)),
                Err(e) => debug!(error = %e, "Ignoring malformed recorder status"),
            }
        }

        for command in command::decode_batch(&self.topics, latest) {
            let result = command.and_then(|command| {
                debug!(command = command.name(), "Replay command");
                state.apply(command, self.clock.now())
            });
            if let Err(e) = result {
                warn!(code = e.code, message = %e.message, "Replay command failed");
                errors.push(e);
            }
        }

        let generation = state.generation();
        drop(state);
        self.changes.send_if_modified(|current| {
            let changed = *current != generation;
            *current = generation;
            changed
        });
        errors
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Publish entries of the loaded session as they fall due.
    pub async fn playback_loop(&self) -> Result<()> {
        let mut changes = self.changes.subscribe();

        'next: loop {
            changes.borrow_and_update();
            let next = {
                let mut state = self.state.lock().await;
                state.next_playback(&self.excluded, self.clock.now())
            };

            let (entry, generation, seek_epoch) = match next {
                Ok(Playback::Idle) => {
                    let _ = changes.changed().await;
                    continue;
                }
                Ok(Playback::Entry {
                    entry,
                    due_in,
                    generation,
                    seek_epoch,
                }) => {
                    if due_in > 0.0 {
                        let deadline = Duration::try_from_secs_f64(due_in)
                            .ok()
                            .and_then(|wait| tokio::time::Instant::now().checked_add(wait));
                        if deadline.is_none() {
                            warn!(due_in, "Entry due beyond the timer range, waiting for a state change");
                        }
                        loop {
                            tokio::select! {
                                _ = sleep_until(deadline) => break,
                                _ = changes.changed() => {
                                    let mut state = self.state.lock().await;
                                    if !state.is_current(generation) {
                                        state.push_back(entry, seek_epoch);
                                        continue 'next;
                                    }
                                }
                            }
                        }
                    }
                    (entry, generation, seek_epoch)
                }
                Err(e) => {
                    self.publish_error(e).await;
                    continue;
                }
            };

            {
                let mut state = self.state.lock().await;
                if !state.is_current(generation) {
                    state.push_back(entry, seek_epoch);
                    continue;
                }
            }

            if let Err(e) = self.publisher.publish(entry.topic, entry.data).await {
                warn!(error = %e, "Failed to publish replayed entry");
            }
            tokio::task::yield_now().await;
        }
    }

    // ========================================================================
    // Periodic broadcasts
    // ========================================================================

    pub async fn status_loop(&self) -> Result<()> {
        loop {
            if !self.state.lock().await.enabled() {
                tokio::time::sleep(DISABLED_STATUS_BACKOFF).await;
            }
            tokio::time::sleep(STATUS_INTERVAL).await;

            let status = self.status().await;
            self.publish(self.topics.status(), status.encode_to_vec()).await;
        }
    }

    pub async fn list_loop(&self) -> Result<()> {
        loop {
            tokio::time::sleep(LIST_INTERVAL).await;
            let list = {
                let mut state = self.state.lock().await;
                if !state.enabled() {
                    continue;
                }
                state.log_list()
            };
            self.publish(self.topics.list(), list.encode_to_vec()).await;
        }
    }

    pub async fn blocker_loop(&self) -> Result<()> {
        loop {
            while !self.state.lock().await.enabled() {
                tokio::time::sleep(DISABLED_POLL).await;
            }
            for service in &self.block_list {
                self.publish(service.block(), Vec::new()).await;
            }
            tokio::time::sleep(BLOCK_INTERVAL).await;
        }
    }

    async fn publish(&self, topic: Bytes, payload: Vec<u8>) {
        if let Err(e) = self.publisher.publish(topic, payload.into()).await {
            warn!(error = %e, "Failed to publish");
        }
    }

    async fn publish_error(&self, err: ServerError) {
        self.publish(
            Bytes::from_static(SERVER_EXCEPTION_TOPIC),
            err.status_response().encode_to_vec(),
        )
        .await;
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
