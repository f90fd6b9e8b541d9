//! Publishing endpoint connected to the relay ingress.
//!
//! `publish` only enqueues. A background writer owns the TCP connection,
//! drains the queue in order, and reconnects with backoff when the relay
//! goes away. Messages queued while disconnected are kept up to the
//! high-water-mark; the message in flight when a write fails is lost.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame::write_frame;
use super::{BusError, Message, MessageQueue, Publish, Result};
use crate::utils::retry::ReconnectDelays;

/// Publisher connected to a relay ingress address.
pub struct BusPublisher {
    addr: String,
    queue: Arc<MessageQueue>,
    writer: JoinHandle<()>,
}

impl BusPublisher {
    /// Start publishing towards `addr` (`host:port`).
    ///
    /// Returns immediately; the connection is established in the background.
    pub fn connect(addr: impl Into<String>, hwm: usize) -> Self {
        let addr = addr.into();
        let queue = Arc::new(MessageQueue::new(hwm));
        let writer = tokio::spawn(run_writer(addr.clone(), queue.clone()));

        debug!(addr = %addr, hwm, "Publisher created");

        Self {
            addr,
            queue,
            writer,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Enqueue a message without awaiting.
    pub fn send(&self, message: Message) -> Result<()> {
        if self.queue.is_closed() {
            return Err(BusError::Closed);
        }
        self.queue.push(message);
        Ok(())
    }

    /// Messages queued but not yet written to the relay.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Messages dropped at the high-water-mark.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

#[async_trait]
impl Publish for BusPublisher {
    async fn publish(&self, topic: Bytes, payload: Bytes) -> Result<()> {
        self.send(Message { topic, payload })
    }
}

impl Drop for BusPublisher {
    fn drop(&mut self) {
        self.queue.close();
        if self.queue.is_empty() {
            self.writer.abort();
        }
    }
}

async fn run_writer(addr: String, queue: Arc<MessageQueue>) {
    let mut delays = ReconnectDelays::new();

    loop {
        if queue.is_closed() && queue.is_empty() {
            return;
        }

        let mut stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                let delay = delays.next_delay();
                debug!(addr = %addr, error = %e, ?delay, "Publisher connect failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        delays.reset();
        let _ = stream.set_nodelay(true);
        info!(addr = %addr, "Publisher connected");

        loop {
            let Some(message) = queue.pop().await else {
                let _ = stream.shutdown().await;
                return;
            };
            if let Err(e) = write_frame(&mut stream, &message).await {
                warn!(
                    addr = %addr,
                    topic = %String::from_utf8_lossy(&message.topic),
                    error = %e,
                    "Publish failed, reconnecting"
                );
                break;
            }
        }
    }
}
