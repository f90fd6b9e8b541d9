//! Wire messages exchanged on the bus and persisted in shard files.
//!
//! Hand-declared prost messages. Field tags are part of the on-disk and
//! on-wire contract and must never be renumbered.

use bytes::Bytes;

/// A single captured bus message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogEntry {
    /// Capture time in seconds since the Unix epoch.
    #[prost(double, tag = "1")]
    pub log_mono_time: f64,
    #[prost(bytes = "bytes", tag = "2")]
    pub topic: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub data: Bytes,
}

/// Structured `(code, message)` pair published on the exception topic.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusResponse {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: String,
}

/// Periodic recorder status.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoggerStatus {
    #[prost(bool, tag = "1")]
    pub recording: bool,
    #[prost(string, tag = "2")]
    pub session_id: String,
}

/// Periodic replay status.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplayerStatus {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(bool, tag = "2")]
    pub playing: bool,
    /// Current playback position in recorded time.
    #[prost(double, tag = "3")]
    pub time: f64,
    #[prost(string, tag = "4")]
    pub log_id: String,
    #[prost(double, tag = "5")]
    pub start_time: f64,
    #[prost(double, tag = "6")]
    pub end_time: f64,
    #[prost(bool, tag = "7")]
    pub looping: bool,
}

/// Request to open a recorded session for playback.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoadLogRequest {
    /// Session directory name (`<id>--<timestamp>`).
    #[prost(string, tag = "1")]
    pub log_id: String,
    #[prost(bool, tag = "2")]
    pub looping: bool,
    #[prost(bool, tag = "3")]
    pub autoplay: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BoolValue {
    #[prost(bool, tag = "1")]
    pub value: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Float64Value {
    #[prost(double, tag = "1")]
    pub value: f64,
}

/// One recorded session as advertised on the list topic.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    /// Directory modification time, seconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub mtime: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogList {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<LogInfo>,
}

/// Wall-clock broadcast by the clock worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Time {
    #[prost(double, tag = "1")]
    pub seconds: f64,
}

/// Liveness signal sent by supervised workers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Heartbeat {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(double, tag = "2")]
    pub timestamp: f64,
}
