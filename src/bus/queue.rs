//! Bounded message queue with high-water-mark dropping.
//!
//! Every bus endpoint buffers through one of these. Once `hwm` messages are
//! queued, pushing a new message evicts the oldest queued message of the same
//! topic, or the oldest message overall when that topic has nothing queued.
//! Producers never block; slow consumers lose stale data instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::debug;

use super::Message;

/// Bounded FIFO shared between one producer side and one consumer side.
#[derive(Debug)]
pub struct MessageQueue {
    messages: Mutex<VecDeque<Message>>,
    notify: Notify,
    hwm: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl MessageQueue {
    /// Create a queue holding at most `hwm` messages (minimum 1).
    pub fn new(hwm: usize) -> Self {
        let hwm = hwm.max(1);
        Self {
            messages: Mutex::new(VecDeque::with_capacity(hwm.min(1024))),
            notify: Notify::new(),
            hwm,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn hwm(&self) -> usize {
        self.hwm
    }

    /// Enqueue a message, evicting per the high-water-mark policy.
    ///
    /// Returns the evicted message, if any.
    pub fn push(&self, message: Message) -> Option<Message> {
        let evicted = {
            let mut messages = self.lock();
            let evicted = if messages.len() >= self.hwm {
                let same_topic = messages.iter().position(|m| m.topic == message.topic);
                match same_topic {
                    Some(pos) => messages.remove(pos),
                    None => messages.pop_front(),
                }
            } else {
                None
            };
            messages.push_back(message);
            evicted
        };

        if let Some(ref m) = evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                topic = %String::from_utf8_lossy(&m.topic),
                dropped_total = total,
                "Queue at high-water-mark, dropped message"
            );
        }

        self.notify.notify_one();
        evicted
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Dequeue, waiting for a message to arrive.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; waiting consumers wake and see `None` once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of messages evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        // A poisoned queue still holds valid messages.
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}
