//! Client error types.

use huddle_core::LinkError;
use huddle_proto::ProtocolError;
use thiserror::Error;

use crate::ComposeError;

/// Errors returned by [`crate::Client::handle`].
///
/// None of these are fatal to the session. The caller logs or surfaces them
/// and keeps feeding events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation needs an open room
    #[error("no room is open for {operation}")]
    NoActiveRoom {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Outgoing message rejected locally
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Link lifecycle error
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Malformed wire data
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Validation and protocol errors are never transient. Sending while the
    /// link is down succeeds once it reconnects.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Link(e) => e.is_transient(),
            Self::Compose(ComposeError::NotConnected { .. }) => true,
            Self::NoActiveRoom { .. } | Self::Compose(_) | Self::Protocol(_) => false,
        }
    }
}
