//! Shared utilities for integration tests.
//!
//! Provides an in-process relay on ephemeral ports and helpers for writing
//! recorded sessions to disk.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use rigbus::bus::{BusSubscriber, Message, Relay};
use rigbus::proto::LogEntry;
use rigbus::recorder::ShardWriter;

/// Default wait for anything crossing a real socket.
pub const NET_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay running on `127.0.0.1` with OS-assigned ports.
pub struct TestRelay {
    pub relay: Arc<Relay>,
    pub ingress: String,
    pub egress: String,
    task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start(hwm: usize) -> Self {
        let relay = Relay::bind("127.0.0.1:0", "127.0.0.1:0", hwm)
            .await
            .expect("Failed to bind relay");
        let (ingress, egress) = relay.local_addrs().expect("Relay has no address");
        let relay = Arc::new(relay);

        let runner = relay.clone();
        let task = tokio::spawn(async move {
            let _ = runner.run().await;
        });

        Self {
            relay,
            ingress: ingress.to_string(),
            egress: egress.to_string(),
            task,
        }
    }

    /// Wait until `count` subscribers hold an egress connection.
    pub async fn wait_for_subscribers(&self, count: usize) {
        tokio::time::timeout(NET_TIMEOUT, async {
            while self.relay.subscriber_count() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Subscribers never connected");
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Receive one message or panic after [`NET_TIMEOUT`].
pub async fn recv(subscriber: &BusSubscriber) -> Message {
    tokio::time::timeout(NET_TIMEOUT, subscriber.recv())
        .await
        .expect("Timed out waiting for message")
        .expect("Subscriber closed")
}

pub fn entry(time: f64, topic: &str, data: &str) -> LogEntry {
    LogEntry {
        log_mono_time: time,
        topic: Bytes::from(topic.to_string()),
        data: Bytes::from(data.to_string()),
    }
}

/// Write `entries` as a session named `name` under `root`, `per_shard`
/// entries to each shard.
pub fn write_session(root: &Path, name: &str, entries: &[LogEntry], per_shard: u64) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create session dir");
    let mut writer =
        ShardWriter::create(&dir, name, per_shard, u64::MAX).expect("Failed to create shard");
    for entry in entries {
        writer.write(entry).expect("Failed to write entry");
    }
    writer.finish();
    dir
}
