//! Application input events.
//!
//! [`AppEvent`] drives the [`crate::App`] state machine. Events come from user
//! interaction and ticks, or are translated from client actions by the
//! [`crate::Bridge`].
//!
//! [`NetworkEvent`] is what a [`crate::Driver`] reports back after performing
//! I/O. The bridge turns it into client events.

use huddle_client::{BatchRequest, LinkState, PageKind};
use huddle_proto::{
    Message, RoomId,
    api::{BotProfile, MemberProfile},
};

use crate::{KeyInput, MessageView};

/// Events processed by the App state machine.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Keyboard input.
    Key(KeyInput),

    /// Periodic tick.
    Tick,

    /// Terminal resize (columns, rows).
    Resize(u16, u16),

    /// The active room's link changed state.
    LinkChanged {
        /// Room the link serves.
        room_id: RoomId,
        /// New state.
        state: LinkState,
    },

    /// The active room's messages changed.
    MessagesUpdated {
        /// Room shown.
        room_id: RoomId,
        /// Messages in ascending id order.
        messages: Vec<MessageView>,
        /// Older history can be loaded.
        has_more: bool,
    },

    /// Scroll to the newest message.
    ScrollToBottom {
        /// Room shown.
        room_id: RoomId,
    },

    /// A message arrived while scrolled up.
    NewMessages {
        /// Room shown.
        room_id: RoomId,
    },

    /// The compose line was sent.
    MessageSent,

    /// Bot choice took effect.
    BotSelected {
        /// Chosen bot name, or `None` when cleared.
        name: Option<String>,
    },

    /// Error occurred.
    Error {
        /// Error description.
        message: String,
    },
}

/// Results of I/O performed by a driver.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A room link is established.
    LinkUp {
        /// Room the link serves.
        room_id: RoomId,
    },

    /// A room link failed or was lost.
    LinkDown {
        /// Room the link serves.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },

    /// Live push on a room link.
    LiveMessage {
        /// Room the link serves.
        room_id: RoomId,
        /// The message.
        message: Message,
    },

    /// History request answered.
    HistoryLoaded {
        /// Room requested.
        room_id: RoomId,
        /// Page requested.
        kind: PageKind,
        /// Entries the backend returned, including any dropped as malformed.
        returned: usize,
        /// Messages in the page.
        messages: Vec<Message>,
    },

    /// History request failed.
    HistoryFailed {
        /// Room requested.
        room_id: RoomId,
        /// Page requested.
        kind: PageKind,
        /// Failure description.
        reason: String,
    },

    /// Reply lookup answered.
    RepliesLoaded {
        /// The request being answered.
        request: BatchRequest,
        /// Messages found.
        messages: Vec<Message>,
    },

    /// Reply lookup failed.
    RepliesFailed {
        /// The request that failed.
        request: BatchRequest,
        /// Failure description.
        reason: String,
    },

    /// Members and bots of a room arrived.
    RosterLoaded {
        /// Room requested.
        room_id: RoomId,
        /// Human members.
        members: Vec<MemberProfile>,
        /// Chatbots.
        bots: Vec<BotProfile>,
    },

    /// Roster request failed. Names fall back to placeholders.
    RosterFailed {
        /// Room requested.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },

    /// Outcome of a telemetry batch submission.
    TelemetryResult {
        /// Batch reported.
        batch_id: u64,
        /// True if accepted.
        ok: bool,
    },

    /// Network became available.
    Online,

    /// Network went away.
    Offline,
}
