//! Chat message types.
//!
//! [`WireMessage`] mirrors the backend JSON exactly (camelCase, optional ids).
//! [`Message`] is the validated domain form used everywhere else: ids are
//! required and the sender is a typed [`SenderRef`].

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Room (chat group) identifier.
pub type RoomId = u64;

/// Server-assigned message identifier, monotonically increasing per room.
pub type MessageId = u64;

/// Human user identifier.
pub type UserId = u64;

/// Chatbot identifier.
pub type BotId = u64;

/// Kind of participant that authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderKind {
    /// A human user.
    #[serde(rename = "USER")]
    Human,
    /// An automated chatbot participant.
    #[serde(rename = "CHATBOT")]
    Bot,
}

/// Typed reference to a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderRef {
    /// Participant kind.
    pub kind: SenderKind,
    /// User ID for humans, bot ID for bots.
    pub id: u64,
}

impl SenderRef {
    /// Reference a human user.
    pub fn human(id: UserId) -> Self {
        Self { kind: SenderKind::Human, id }
    }

    /// Reference a chatbot.
    pub fn bot(id: BotId) -> Self {
        Self { kind: SenderKind::Bot, id }
    }

    /// True if the sender is a chatbot.
    pub fn is_bot(&self) -> bool {
        self.kind == SenderKind::Bot
    }
}

/// Message type tag carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MsgType {
    /// Plain room message.
    #[default]
    Text,
    /// Message addressed to a chatbot.
    Bot,
}

/// A chat message in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned ID. Unique and ordered within the room.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender: SenderRef,
    /// Text content, may contain lightweight markup.
    pub content: String,
    /// Creation time in Unix milliseconds.
    pub created_at: u64,
    /// Message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// Wire message type.
    pub msg_type: MsgType,
}

impl Message {
    /// Parse a message from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_str(json)?;
        Self::try_from(wire)
    }

    /// Convert an already parsed JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_value(value)?;
        Self::try_from(wire)
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&WireMessage::from(self))?)
    }
}

/// JSON message object as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message ID. Absent on malformed payloads.
    pub msg_id: Option<MessageId>,
    /// Room ID. Absent on malformed payloads.
    pub group_id: Option<RoomId>,
    /// Author ID (user ID, or bot ID when `bot_id` is absent for bot senders).
    pub sender_id: u64,
    /// Author kind.
    pub sender_type: SenderKind,
    /// Text content.
    pub content: String,
    /// Creation time in Unix milliseconds.
    pub create_time: u64,
    /// Replied-to message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_msg_id: Option<MessageId>,
    /// Message type tag.
    #[serde(default)]
    pub msg_type: MsgType,
    /// Bot addressed by, or authoring, this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<BotId>,
}

impl TryFrom<WireMessage> for Message {
    type Error = ProtocolError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = wire.msg_id.ok_or(ProtocolError::MissingField("msgId"))?;
        let room_id = wire.group_id.ok_or(ProtocolError::MissingField("groupId"))?;

        let sender = match wire.sender_type {
            SenderKind::Human => SenderRef::human(wire.sender_id),
            SenderKind::Bot => SenderRef::bot(wire.bot_id.unwrap_or(wire.sender_id)),
        };

        Ok(Self {
            id,
            room_id,
            sender,
            content: wire.content,
            created_at: wire.create_time,
            reply_to: wire.reply_to_msg_id,
            msg_type: wire.msg_type,
        })
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            msg_id: Some(message.id),
            group_id: Some(message.room_id),
            sender_id: message.sender.id,
            sender_type: message.sender.kind,
            content: message.content.clone(),
            create_time: message.created_at,
            reply_to_msg_id: message.reply_to,
            msg_type: message.msg_type,
            bot_id: message.sender.is_bot().then_some(message.sender.id),
        }
    }
}
