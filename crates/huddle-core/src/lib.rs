//! Huddle core.
//!
//! Runtime-agnostic building blocks shared by the session client and its
//! drivers:
//!
//! - [`env::Environment`]: time and randomness behind a trait so protocol
//!   logic runs under a virtual clock in tests
//! - [`LinkState`]: observable state of a room's real-time link
//! - [`ReconnectController`]: exponential-backoff retry state machine
//!
//! Nothing here performs I/O. State machines take the current time as a
//! parameter and return actions for the caller to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod link;
mod reconnect;

pub use error::LinkError;
pub use link::LinkState;
pub use reconnect::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MAX_JITTER,
    ReconnectAction, ReconnectConfig, ReconnectController,
};
