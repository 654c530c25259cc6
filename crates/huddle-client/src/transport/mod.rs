//! WebSocket/STOMP and HTTP transport.
//!
//! Thin I/O layers that move frames and JSON bodies. Session logic stays in
//! the Sans-IO [`crate::Client`]; the driver feeds what these produce back in
//! as [`crate::ClientEvent`]s.

mod api;
mod link;
mod network;
mod system_env;

pub use api::ApiClient;
use huddle_proto::ProtocolError;
pub use link::{LinkConfig, LinkEvent, StompLink};
pub use network::{DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_TIMEOUT, NetworkMonitor, Reachability};
pub use system_env::SystemEnv;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket connect or handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The link task has stopped.
    #[error("link closed")]
    Closed,

    /// HTTP request failed or returned an error status.
    #[error("http error: {0}")]
    Http(String),

    /// Payload could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Protocol(ProtocolError::Json(err.to_string()));
        }
        Self::Http(err.to_string())
    }
}
