//! Topic naming and matching.
//!
//! Topics are slash-delimited byte strings such as `/replayd/in/start/`.
//! Subscriptions match by plain byte prefix, so the empty prefix matches
//! everything.

use bytes::Bytes;

/// Domain errors from every server are published here.
pub const SERVER_EXCEPTION_TOPIC: &[u8] = b"/server_exception/";

/// Workers publish heartbeats on `/heartbeat/<name>/`.
pub const HEARTBEAT_PREFIX: &str = "/heartbeat/";

/// Clock worker output topic.
pub const TIME_TOPIC: &[u8] = b"/mp/time/";

/// Default recorder service name.
pub const RECORDER_SERVICE: &str = "loggerd";
/// Default replay service name.
pub const REPLAY_SERVICE: &str = "replayd";
/// Default clock service name.
pub const CLOCK_SERVICE: &str = "timed";

/// Check whether `topic` falls under the subscription `prefix`.
pub fn topic_matches(topic: &[u8], prefix: &[u8]) -> bool {
    topic.starts_with(prefix)
}

/// Check whether `topic` falls under any of `prefixes`.
pub fn matches_any<P: AsRef<[u8]>>(topic: &[u8], prefixes: &[P]) -> bool {
    prefixes.iter().any(|p| topic_matches(topic, p.as_ref()))
}

/// Heartbeat topic for a named worker.
pub fn heartbeat_topic(name: &str) -> Bytes {
    Bytes::from(format!("{}{}/", HEARTBEAT_PREFIX, name))
}

/// Worker name carried by a heartbeat topic, if `topic` is one.
pub fn heartbeat_name(topic: &[u8]) -> Option<&str> {
    let rest = topic.strip_prefix(HEARTBEAT_PREFIX.as_bytes())?;
    let name = rest.strip_suffix(b"/").unwrap_or(rest);
    if name.is_empty() {
        return None;
    }
    std::str::from_utf8(name).ok()
}

/// Control and status topics of one named service.
///
/// Commands arrive on `/<service>/in/<command>/`; status goes out on
/// `/<service>/status/` and `/<service>/list/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopics {
    service: String,
}

impl ServiceTopics {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Prefix covering every topic the service owns.
    pub fn root(&self) -> Bytes {
        Bytes::from(format!("/{}/", self.service))
    }

    /// Prefix covering every command addressed to the service.
    pub fn inbox(&self) -> Bytes {
        Bytes::from(format!("/{}/in/", self.service))
    }

    pub fn command(&self, command: &str) -> Bytes {
        Bytes::from(format!("/{}/in/{}/", self.service, command))
    }

    pub fn status(&self) -> Bytes {
        Bytes::from(format!("/{}/status/", self.service))
    }

    pub fn list(&self) -> Bytes {
        Bytes::from(format!("/{}/list/", self.service))
    }

    /// Topic that tells this service to suspend live production.
    pub fn block(&self) -> Bytes {
        self.command("block")
    }
}
