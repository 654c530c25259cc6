//! HTTP API shapes.
//!
//! Request and response bodies for the versioned JSON endpoints the session
//! manager consumes. Paths are relative to the API base URL.

use serde::{Deserialize, Serialize};

use crate::{BotId, Message, MessageId, ProtocolError, RoomId, UserId, WireMessage};

/// Number of messages requested per history page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Path for batched telemetry submission.
pub const TRACK_BATCH_PATH: &str = "/v1/track/batch";

/// Path for single telemetry event submission.
pub const TRACK_EVENT_PATH: &str = "/v1/track";

/// Cursor-paginated history request.
///
/// Without a cursor the newest page is returned. With a cursor, the page holds
/// the newest messages strictly older than `last_msg_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Room to read.
    pub room_id: RoomId,
    /// Oldest message already loaded. `None` for the newest page.
    pub last_msg_id: Option<MessageId>,
    /// Maximum number of messages returned.
    pub page_size: usize,
}

impl HistoryQuery {
    /// Request path.
    pub fn path(&self) -> String {
        format!("/v1/groups/{}/messages", self.room_id)
    }

    /// Query string parameters.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("pageSize", self.page_size.to_string())];
        if let Some(last) = self.last_msg_id {
            pairs.push(("lastMsgId", last.to_string()));
        }
        pairs
    }
}

/// History and batch lookup response body.
///
/// Entries stay raw JSON until [`HistoryPage::decode`] so one malformed entry
/// cannot reject the whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Message objects in the page, any order.
    #[serde(alias = "data", default)]
    pub messages: Vec<serde_json::Value>,
}

impl HistoryPage {
    /// Page holding the wire form of `messages`.
    pub fn from_messages(messages: &[Message]) -> Result<Self, ProtocolError> {
        let messages = messages
            .iter()
            .map(|message| serde_json::to_value(WireMessage::from(message)))
            .collect::<Result<_, _>>()?;
        Ok(Self { messages })
    }

    /// Validate each entry, keeping the ones that decode.
    pub fn decode(self) -> DecodedPage {
        let returned = self.messages.len();
        let mut messages = Vec::with_capacity(returned);
        let mut dropped = Vec::new();

        for value in self.messages {
            match Message::from_value(value) {
                Ok(message) => messages.push(message),
                Err(err) => dropped.push(err),
            }
        }

        DecodedPage { returned, messages, dropped }
    }
}

/// A [`HistoryPage`] after per-entry validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPage {
    /// Entries the backend returned, valid or not.
    pub returned: usize,
    /// Entries that decoded, in response order.
    pub messages: Vec<Message>,
    /// Why each dropped entry was rejected.
    pub dropped: Vec<ProtocolError>,
}

/// Batch message-by-id request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFetchRequest {
    /// Requested message IDs.
    #[serde(rename = "msgIds")]
    pub msg_ids: Vec<MessageId>,
}

/// Path for batch message-by-id fetches in a room.
pub fn batch_fetch_path(room_id: RoomId) -> String {
    format!("/v1/groups/{room_id}/messages/batch")
}

/// Path listing a room's members.
pub fn members_path(room_id: RoomId) -> String {
    format!("/v1/groups/{room_id}/members")
}

/// Path listing a room's bots.
pub fn bots_path(room_id: RoomId) -> String {
    format!("/v1/groups/{room_id}/bots")
}

/// Room member as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    /// User ID.
    pub user_id: UserId,
    /// Display name.
    #[serde(alias = "nickname")]
    pub name: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Room chatbot as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotProfile {
    /// Bot ID.
    pub bot_id: BotId,
    /// Display name, also the mention handle.
    pub name: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Tracked client-side event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedEventType {
    /// Compose box content changed.
    Typing,
}

/// Client-side analytics event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    /// Event kind.
    pub event_type: TrackedEventType,
    /// Room the event happened in.
    pub group_id: RoomId,
    /// Acting user.
    pub user_id: UserId,
    /// Compose box snapshot.
    pub content: String,
    /// Unix milliseconds.
    pub timestamp: u64,
}

impl TrackedEvent {
    /// Typing activity snapshot.
    pub fn typing(group_id: RoomId, user_id: UserId, content: String, timestamp: u64) -> Self {
        Self { event_type: TrackedEventType::Typing, group_id, user_id, content, timestamp }
    }
}

/// Batched telemetry submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackBatch {
    /// Events in the batch.
    pub events: Vec<TrackedEvent>,
}
