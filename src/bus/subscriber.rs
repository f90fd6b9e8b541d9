//! Subscribing endpoint connected to the relay egress.
//!
//! The relay forwards everything; prefix filtering happens here, before a
//! message is queued. A background reader owns the connection and
//! reconnects with backoff. Subscriptions are local state and survive
//! reconnects.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame::read_frame;
use super::{BusError, Message, MessageQueue, Result};
use crate::topics::matches_any;
use crate::utils::retry::ReconnectDelays;

/// Default cap on how many queued messages one `receive_latest` drains.
pub const DEFAULT_MAX_SKIP: usize = 1000;

/// Newest payload per topic, as returned by [`BusSubscriber::receive_latest`].
pub type LatestMessages = HashMap<Bytes, Bytes>;

type Prefixes = Arc<RwLock<Vec<Bytes>>>;

/// Subscriber connected to a relay egress address.
pub struct BusSubscriber {
    queue: Arc<MessageQueue>,
    prefixes: Prefixes,
    reader: Option<JoinHandle<()>>,
    max_skip: usize,
}

impl BusSubscriber {
    /// Start receiving from `addr` (`host:port`).
    ///
    /// Returns immediately; nothing is queued until [`subscribe`](Self::subscribe)
    /// is called with a matching prefix.
    pub fn connect(addr: impl Into<String>, hwm: usize) -> Self {
        let addr = addr.into();
        let queue = Arc::new(MessageQueue::new(hwm));
        let prefixes: Prefixes = Arc::new(RwLock::new(Vec::new()));
        let reader = tokio::spawn(run_reader(addr.clone(), queue.clone(), prefixes.clone()));

        debug!(addr = %addr, hwm, "Subscriber created");

        Self {
            queue,
            prefixes,
            reader: Some(reader),
            max_skip: DEFAULT_MAX_SKIP,
        }
    }

    /// Subscriber fed by hand through [`inject`](Self::inject), with no
    /// network connection.
    pub fn detached(hwm: usize) -> Self {
        Self {
            queue: Arc::new(MessageQueue::new(hwm)),
            prefixes: Arc::new(RwLock::new(Vec::new())),
            reader: None,
            max_skip: DEFAULT_MAX_SKIP,
        }
    }

    /// Override the drain cap used by [`receive_latest`](Self::receive_latest).
    pub fn with_max_skip(mut self, max_skip: usize) -> Self {
        self.max_skip = max_skip;
        self
    }

    /// Receive messages whose topic starts with `prefix`.
    ///
    /// The empty prefix subscribes to everything.
    pub fn subscribe(&self, prefix: impl Into<Bytes>) {
        let prefix = prefix.into();
        debug!(prefix = %String::from_utf8_lossy(&prefix), "Subscribed");
        let mut prefixes = self.prefixes.write().unwrap_or_else(|e| e.into_inner());
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    /// Queue a message as if it arrived from the relay, applying filters.
    pub fn inject(&self, message: Message) {
        if accepts(&self.prefixes, &message.topic) {
            self.queue.push(message);
        }
    }

    /// Wait for the next message.
    pub async fn recv(&self) -> Result<Message> {
        self.queue.pop().await.ok_or(BusError::Closed)
    }

    /// Next message if one is already queued.
    pub fn try_recv(&self) -> Option<Message> {
        self.queue.try_pop()
    }

    /// Wait for at least one message, then drain what is already queued.
    ///
    /// Keeps only the newest payload per topic. The first message seen whose
    /// topic is listed in `no_drop` ends the drain immediately, so such a
    /// topic is never collapsed with a later message on the same topic; the
    /// rest stays queued for the next call.
    pub async fn receive_latest(&self, no_drop: &[&[u8]]) -> Result<LatestMessages> {
        self.receive_latest_with(no_drop, self.max_skip).await
    }

    /// [`receive_latest`](Self::receive_latest) with an explicit drain cap.
    pub async fn receive_latest_with(
        &self,
        no_drop: &[&[u8]],
        max_skip: usize,
    ) -> Result<LatestMessages> {
        let mut latest = LatestMessages::new();

        let first = self.recv().await?;
        let stop = is_no_drop(no_drop, &first.topic);
        latest.insert(first.topic, first.payload);
        if stop {
            return Ok(latest);
        }

        for _ in 0..max_skip {
            let Some(message) = self.try_recv() else {
                break;
            };
            let stop = is_no_drop(no_drop, &message.topic);
            latest.insert(message.topic, message.payload);
            if stop {
                break;
            }
        }

        Ok(latest)
    }

    /// Messages dropped at the high-water-mark.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for BusSubscriber {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.queue.close();
    }
}

fn is_no_drop(no_drop: &[&[u8]], topic: &[u8]) -> bool {
    no_drop.iter().any(|t| *t == topic)
}

fn accepts(prefixes: &Prefixes, topic: &[u8]) -> bool {
    let prefixes = prefixes.read().unwrap_or_else(|e| e.into_inner());
    matches_any(topic, prefixes.as_slice())
}

async fn run_reader(addr: String, queue: Arc<MessageQueue>, prefixes: Prefixes) {
    let mut delays = ReconnectDelays::new();

    loop {
        let mut stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                let delay = delays.next_delay();
                debug!(addr = %addr, error = %e, ?delay, "Subscriber connect failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        delays.reset();
        info!(addr = %addr, "Subscriber connected");

        loop {
            match read_frame(&mut stream).await {
                Ok(Some(message)) => {
                    if accepts(&prefixes, &message.topic) {
                        queue.push(message);
                    }
                }
                Ok(None) => {
                    info!(addr = %addr, "Relay closed connection, reconnecting");
                    break;
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Bad read from relay, reconnecting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &'static str, payload: &'static str) -> Message {
        Message::new(topic.as_bytes(), payload.as_bytes())
    }

    #[tokio::test]
    async fn test_filters_by_prefix() {
        let sub = BusSubscriber::detached(16);
        sub.subscribe(&b"/replayd/in/"[..]);

        sub.inject(msg("/loggerd/status/", "x"));
        sub.inject(msg("/replayd/in/start/", "go"));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.topic, "/replayd/in/start/");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_receive_latest_coalesces_per_topic() {
        let sub = BusSubscriber::detached(16);
        sub.subscribe(Bytes::new());

        for payload in ["1", "2", "3"] {
            sub.inject(msg("/camera/", payload));
        }
        sub.inject(msg("/volume/", "v"));

        let latest = sub.receive_latest(&[]).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.get(&b"/camera/"[..]).unwrap(), "3");
        assert_eq!(latest.get(&b"/volume/"[..]).unwrap(), "v");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_receive_latest_delivers_every_no_drop_message() {
        let sub = BusSubscriber::detached(16);
        sub.subscribe(Bytes::new());
        let priority: &[u8] = b"/priority_project_request/";

        sub.inject(msg("/camera/", "c1"));
        sub.inject(msg("/priority_project_request/", "p1"));
        sub.inject(msg("/priority_project_request/", "p2"));
        sub.inject(msg("/camera/", "c2"));

        let first = sub.receive_latest(&[priority]).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.get(priority).unwrap(), "p1");

        let second = sub.receive_latest(&[priority]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.get(priority).unwrap(), "p2");

        let third = sub.receive_latest(&[priority]).await.unwrap();
        assert_eq!(third.get(&b"/camera/"[..]).unwrap(), "c2");
    }

    #[tokio::test]
    async fn test_receive_latest_honours_max_skip() {
        let sub = BusSubscriber::detached(16).with_max_skip(0);
        sub.subscribe(Bytes::new());

        sub.inject(msg("/a/", "1"));
        sub.inject(msg("/a/", "2"));

        let latest = sub.receive_latest(&[]).await.unwrap();
        assert_eq!(latest.get(&b"/a/"[..]).unwrap(), "1");
        assert_eq!(sub.try_recv().unwrap().payload, "2");
    }
}
