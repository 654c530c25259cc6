//! Client
//!
//! Action-based chat session state machine for Huddle rooms. Keeps the active
//! room's message store consistent while history pages, live pushes and reply
//! lookups arrive in any order.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based patterns as
//! [`huddle_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: Top-level reducer for the active room
//! - [`MessageStore`]: Ordered, deduplicated messages with backward pagination
//! - [`ReplyResolver`]: Batches lookups of reply targets missing locally
//! - [`Composer`]: Validates and frames outgoing messages
//! - [`TelemetryBatcher`]: Buffers typing activity and flushes it in batches
//! - [`Roster`]: Room-scoped member and bot profiles
//! - [`ConnectionRegistry`]: Room to link cache shared across views
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::StompLink`]: WebSocket/STOMP link for one room
//! - [`transport::ApiClient`]: HTTP JSON API client
//! - [`transport::NetworkMonitor`]: Reachability checks standing in for
//!   online/offline notifications
//! - [`transport::SystemEnv`]: Production environment

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod composer;
mod error;
mod event;
mod registry;
mod resolver;
mod roster;
mod store;
mod telemetry;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, SessionConfig};
pub use composer::{ComposeError, Composer, MAX_CONTENT_CHARS, find_mention};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use huddle_core::{LinkState, env::Environment};
pub use huddle_proto::{BotId, Message, MessageId, RoomId, UserId};
pub use registry::{ConnectionRegistry, LinkHandle};
pub use resolver::{BatchRequest, ReplyResolver, ResolverOutcome};
pub use roster::{Profile, Roster, Sender};
pub use store::{
    Ingest, MessageStore, NEAR_BOTTOM_PX, PageKind, ReplyState, Resolution, ScrollHint,
    StoredMessage, Viewport,
};
pub use telemetry::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BATCH, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL,
    FlushReason, TelemetryAction, TelemetryBatcher, TelemetryConfig,
};
