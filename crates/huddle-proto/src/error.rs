//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding wire data.
///
/// All variants are data errors: the offending frame or response is dropped
/// and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// JSON payload could not be parsed or produced.
    #[error("json error: {0}")]
    Json(String),

    /// Required field absent from an inbound payload.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// STOMP frame violates the framing rules.
    #[error("malformed stomp frame: {0}")]
    Stomp(String),

    /// STOMP command not recognized.
    #[error("unknown stomp command: {0}")]
    UnknownCommand(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
