//! Replay control commands decoded from the bus.

use bytes::Bytes;
use prost::Message as _;

use crate::bus::LatestMessages;
use crate::error::ServerError;
use crate::proto::{BoolValue, Float64Value, LoadLogRequest};
use crate::topics::ServiceTopics;

/// A decoded replay command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCommand {
    Enable,
    Disable,
    Load(LoadLogRequest),
    Loop(bool),
    Start,
    Stop,
    Scrub(f64),
}

impl ReplayCommand {
    /// Command name as it appears in the topic.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Load(_) => "load",
            Self::Loop(_) => "loop",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Scrub(_) => "scrub",
        }
    }

    /// Whether the command is accepted while the replayer is disabled.
    pub fn bypasses_gate(&self) -> bool {
        matches!(self, Self::Enable)
    }
}

/// Order in which commands from one batch are applied.
pub const COMMAND_ORDER: [&str; 7] = [
    "enable", "disable", "load", "loop", "start", "stop", "scrub",
];

/// Decode every command present in a coalesced batch, in application order.
///
/// Malformed payloads decode to an error in place of the command.
pub fn decode_batch(
    topics: &ServiceTopics,
    latest: &LatestMessages,
) -> Vec<Result<ReplayCommand, ServerError>> {
    COMMAND_ORDER
        .iter()
        .filter_map(|name| {
            let payload = latest.get(&topics.command(name))?;
            Some(decode(name, payload))
        })
        .collect()
}

/// Decode the payload of the command named `name`.
pub fn decode(name: &str, payload: &Bytes) -> Result<ReplayCommand, ServerError> {
    let malformed = |e: prost::DecodeError| ServerError::bad_request(format!("malformed {}: {}", name, e));
    let command = match name {
        "enable" => ReplayCommand::Enable,
        "disable" => ReplayCommand::Disable,
        "load" => ReplayCommand::Load(LoadLogRequest::decode(payload.clone()).map_err(malformed)?),
        "loop" => ReplayCommand::Loop(BoolValue::decode(payload.clone()).map_err(malformed)?.value),
        "start" => ReplayCommand::Start,
        "stop" => ReplayCommand::Stop,
        "scrub" => ReplayCommand::Scrub(Float64Value::decode(payload.clone()).map_err(malformed)?.value),
        other => return Err(ServerError::bad_request(format!("unknown command {}", other))),
    };
    Ok(command)
}
