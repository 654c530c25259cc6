//! Outbound message payload.

use serde::{Deserialize, Serialize};

use crate::{BotId, MessageId, MsgType, ProtocolError, RoomId, UserId};

/// JSON body published on the real-time channel to send a message.
///
/// `bot_id` and `reply_to_msg_id` are always present on the wire, as `null`
/// when unused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    /// Target room.
    pub group_id: RoomId,
    /// Authoring user.
    pub sender_id: UserId,
    /// Trimmed message content.
    pub content: String,
    /// [`MsgType::Bot`] when a bot is addressed.
    pub msg_type: MsgType,
    /// Composition time in Unix milliseconds.
    pub create_time: u64,
    /// Addressed bot.
    pub bot_id: Option<BotId>,
    /// Replied-to message.
    pub reply_to_msg_id: Option<MessageId>,
}

impl OutboundFrame {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}
