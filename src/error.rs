//! Domain errors reported to operators over the bus.
//!
//! A `ServerError` never unwinds past a server's top-level loop: it is
//! converted to a [`StatusResponse`] and published on
//! [`SERVER_EXCEPTION_TOPIC`](crate::topics::SERVER_EXCEPTION_TOPIC).

use crate::proto::StatusResponse;

/// Status code for malformed requests and unmet preconditions.
pub const BAD_REQUEST: u32 = 400;
/// Status code for references to unknown resources.
pub const NOT_FOUND: u32 = 404;
/// Status code for requests that collide with current state.
pub const CONFLICT: u32 = 409;
/// Status code for local I/O or decoding failures.
pub const INTERNAL: u32 = 500;

/// Structured `(code, message)` domain error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ServerError({code}, {message})")]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

impl ServerError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL, message)
    }

    /// Wire form published on the exception topic.
    pub fn status_response(&self) -> StatusResponse {
        StatusResponse {
            code: self.code,
            message: self.message.clone(),
        }
    }
}

impl From<prost::DecodeError> for ServerError {
    fn from(e: prost::DecodeError) -> Self {
        Self::bad_request(format!("malformed message: {}", e))
    }
}
