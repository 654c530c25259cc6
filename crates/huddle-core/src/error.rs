//! Link error types.
//!
//! Connectivity failures are never fatal to the session. They are retried by
//! the reconnection controller and surfaced through [`LinkState`].

use thiserror::Error;

use crate::LinkState;

/// Errors raised by link lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state}")]
    InvalidState {
        /// Current state when error occurred
        state: LinkState,
        /// Operation that was attempted
        operation: String,
    },

    /// Network reported offline
    #[error("network offline")]
    Offline,

    /// Retry budget used up
    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted {
        /// Retries scheduled before giving up
        attempts: u32,
    },

    /// Underlying transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Link closed locally or by the broker
    #[error("link closed")]
    Closed,
}

impl LinkError {
    /// Returns true if the failure may clear up on a later attempt.
    ///
    /// Exhausted retries and invalid transitions need an external trigger
    /// (network online, manual retry) before trying again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Closed | Self::Offline)
    }
}
