//! Client events and actions.

use huddle_core::LinkState;
use huddle_proto::{
    BotId, HistoryQuery, Message, MessageId, OutboundFrame, RoomId,
    api::{BotProfile, MemberProfile, TrackedEvent},
};

use crate::{BatchRequest, PageKind, Viewport};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Forwarding link notifications and network availability
/// - Delivering HTTP responses, tagged with the room they were requested for
/// - Driving time forward via ticks
/// - Forwarding user intents (open room, edit draft, send, ...)
///
/// Generic over `I` (Instant type) to support both production and simulated
/// clocks.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// User opened a room. Switching from another room discards its state.
    OpenRoom {
        /// Room to open.
        room_id: RoomId,
    },

    /// User left every view of the active room.
    CloseRoom,

    /// User logged out. Drops every link and cache.
    Logout,

    /// The room's link is established and subscribed.
    LinkUp {
        /// Room the link serves.
        room_id: RoomId,
    },

    /// The room's link failed to connect or was lost.
    LinkDown {
        /// Room the link serves.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },

    /// The network became available.
    NetworkOnline,

    /// The network went away.
    NetworkOffline,

    /// User asked to reconnect now.
    RetryNow,

    /// History page arrived.
    HistoryLoaded {
        /// Room the page was requested for.
        room_id: RoomId,
        /// Page the request was for.
        kind: PageKind,
        /// Entries the backend returned, including any dropped as malformed.
        returned: usize,
        /// Messages in the page, any order.
        messages: Vec<Message>,
    },

    /// History request failed.
    HistoryFailed {
        /// Room the page was requested for.
        room_id: RoomId,
        /// Page the request was for.
        kind: PageKind,
        /// Failure description.
        reason: String,
    },

    /// Message pushed on the live channel.
    LiveMessage {
        /// Room whose topic delivered it.
        room_id: RoomId,
        /// The message.
        message: Message,
        /// Viewport measured before insertion.
        viewport: Viewport,
    },

    /// User scrolled to the top and wants older messages.
    LoadOlder,

    /// Batch reply lookup answered.
    RepliesLoaded {
        /// Room the lookup was for.
        room_id: RoomId,
        /// Request being answered.
        request_id: u64,
        /// Messages found. Requested ids absent here do not exist.
        messages: Vec<Message>,
    },

    /// Batch reply lookup failed.
    RepliesFailed {
        /// Room the lookup was for.
        room_id: RoomId,
        /// Request that failed.
        request_id: u64,
        /// Failure description.
        reason: String,
    },

    /// Members and bots of a room arrived.
    RosterLoaded {
        /// Room the roster belongs to.
        room_id: RoomId,
        /// Human members.
        members: Vec<MemberProfile>,
        /// Chatbots.
        bots: Vec<BotProfile>,
    },

    /// Compose box text changed.
    DraftChanged {
        /// New text.
        text: String,
    },

    /// User chose a message to reply to.
    StartReply {
        /// Message being replied to.
        msg_id: MessageId,
    },

    /// User dropped the reply in progress.
    CancelReply,

    /// User picked a bot to address, or cleared the pick.
    SelectBot {
        /// Bot to address.
        bot_id: Option<BotId>,
    },

    /// User pressed send.
    Send,

    /// Outcome of a telemetry batch submission.
    TelemetryResult {
        /// Batch being reported.
        batch_id: u64,
        /// True if the backend accepted it.
        ok: bool,
    },

    /// The page is going away.
    Unload,

    /// Time tick for retries and periodic flushes.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Acquire a link for the room and report `LinkUp`/`LinkDown`.
    Dial {
        /// Room to connect.
        room_id: RoomId,
    },

    /// Close cached links.
    ReleaseLinks {
        /// Room whose link to close, or every room when `None`.
        room_id: Option<RoomId>,
    },

    /// Fetch a history page and report `HistoryLoaded`/`HistoryFailed`.
    FetchHistory {
        /// Page being fetched.
        kind: PageKind,
        /// Request parameters.
        query: HistoryQuery,
    },

    /// Fetch reply targets by id and report `RepliesLoaded`/`RepliesFailed`.
    FetchReplies(BatchRequest),

    /// Fetch members and bots and report `RosterLoaded`.
    FetchRoster {
        /// Room to fetch.
        room_id: RoomId,
    },

    /// Publish a message on the room's link.
    Transmit {
        /// Destination room.
        room_id: RoomId,
        /// Payload.
        frame: OutboundFrame,
    },

    /// Submit a telemetry batch and report `TelemetryResult`.
    SubmitTelemetry {
        /// Correlates the result.
        batch_id: u64,
        /// Events in the batch.
        events: Vec<TrackedEvent>,
        /// Submission number, starting at 1.
        attempt: u32,
    },

    /// Submit one telemetry event. No result is expected.
    SubmitTelemetryEvent(TrackedEvent),

    /// The active room's link state changed.
    LinkStateChanged {
        /// Room the link serves.
        room_id: RoomId,
        /// New state.
        state: LinkState,
    },

    /// The active room's messages changed and should be re-rendered.
    StoreChanged {
        /// Room whose store changed.
        room_id: RoomId,
    },

    /// Scroll the message list to the newest message.
    ScrollToBottom {
        /// Room whose list to scroll.
        room_id: RoomId,
    },

    /// Show the "new messages" indicator without scrolling.
    NewMessageIndicator {
        /// Room that received the message.
        room_id: RoomId,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
