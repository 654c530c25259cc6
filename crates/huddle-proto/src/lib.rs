//! Huddle wire protocol
//!
//! Data types exchanged with the room chat backend and the framing used on the
//! real-time channel.
//!
//! # Components
//!
//! - [`Message`]: Domain message, converted from the JSON [`WireMessage`]
//! - [`OutboundFrame`]: JSON payload published when sending a message
//! - [`StompFrame`]: STOMP 1.2 text frame codec for the publish/subscribe
//!   channel
//! - [`api`]: HTTP request/response shapes and endpoint paths

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
mod error;
mod frame;
mod message;
pub mod stomp;

pub use api::HistoryQuery;
pub use error::ProtocolError;
pub use frame::OutboundFrame;
pub use message::{
    BotId, Message, MessageId, MsgType, RoomId, SenderKind, SenderRef, UserId, WireMessage,
};
pub use stomp::{StompCommand, StompFrame};
