//! Outbound message composition.
//!
//! Holds the compose box, the reply in progress and the selected bot.
//! Validation happens before anything touches the network. A successful send
//! resets all three. Nothing is inserted into the store: a sent message shows
//! up once the live channel echoes it back.

use huddle_core::LinkState;
use huddle_proto::{BotId, MessageId, MsgType, OutboundFrame, RoomId, UserId};
use thiserror::Error;

/// Longest accepted message, in characters after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Reasons a message is rejected before sending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// Nothing but whitespace
    #[error("message is empty")]
    Empty,

    /// Over the length limit
    #[error("message is {len} characters, limit is {max}")]
    TooLong {
        /// Trimmed length
        len: usize,
        /// Limit
        max: usize,
    },

    /// No room is open
    #[error("no room is open")]
    NoRoom,

    /// The room's link cannot carry the message
    #[error("cannot send while {state}")]
    NotConnected {
        /// Link state at send time
        state: LinkState,
    },
}

/// Compose box state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
    reply_to: Option<MessageId>,
    selected_bot: Option<BotId>,
}

impl Composer {
    /// Create an empty composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current compose box text.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the compose box text.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Message being replied to.
    pub fn reply_to(&self) -> Option<MessageId> {
        self.reply_to
    }

    /// Start replying to a message.
    pub fn start_reply(&mut self, id: MessageId) {
        self.reply_to = Some(id);
    }

    /// Drop the reply in progress.
    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    /// Bot picked explicitly, overriding mentions.
    pub fn selected_bot(&self) -> Option<BotId> {
        self.selected_bot
    }

    /// Pick a bot, or clear the pick.
    pub fn select_bot(&mut self, bot: Option<BotId>) {
        self.selected_bot = bot;
    }

    /// Reset everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Trimmed draft, if sendable.
    pub fn validate(&self) -> Result<&str, ComposeError> {
        let content = self.draft.trim();
        if content.is_empty() {
            return Err(ComposeError::Empty);
        }

        let len = content.chars().count();
        if len > MAX_CONTENT_CHARS {
            return Err(ComposeError::TooLong { len, max: MAX_CONTENT_CHARS });
        }

        Ok(content)
    }

    /// Validate and frame the draft, then reset.
    ///
    /// The addressed bot is the selected one, or else the first `@name`
    /// mention of a room bot. On error the state is left untouched.
    pub fn take_frame(
        &mut self,
        room_id: RoomId,
        sender_id: UserId,
        bots: &[(BotId, &str)],
        create_time: u64,
    ) -> Result<OutboundFrame, ComposeError> {
        let content = self.validate()?.to_string();
        let bot_id = self.selected_bot.or_else(|| find_mention(&content, bots));

        let frame = OutboundFrame {
            group_id: room_id,
            sender_id,
            msg_type: if bot_id.is_some() { MsgType::Bot } else { MsgType::Text },
            content,
            create_time,
            bot_id,
            reply_to_msg_id: self.reply_to,
        };

        self.clear();
        Ok(frame)
    }
}

/// First `@name` mention of one of `bots` in `content`.
///
/// A mention starts at the beginning of the text or after whitespace and must
/// end at a word boundary. Names match ignoring ASCII case, and the longest
/// matching name wins at a given position.
pub fn find_mention(content: &str, bots: &[(BotId, &str)]) -> Option<BotId> {
    let mut prev: Option<char> = None;

    for (at, c) in content.char_indices() {
        let starts_token = prev.is_none_or(char::is_whitespace);
        prev = Some(c);
        if c != '@' || !starts_token {
            continue;
        }

        let rest = content.get(at + 1..).unwrap_or_default();
        let best = bots
            .iter()
            .filter(|(_, name)| !name.is_empty() && mentions(rest, name))
            .max_by_key(|(_, name)| name.len());

        if let Some((id, _)) = best {
            return Some(*id);
        }
    }

    None
}

fn mentions(rest: &str, name: &str) -> bool {
    let Some(head) = rest.get(..name.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(name) {
        return false;
    }
    rest.get(name.len()..)
        .and_then(|tail| tail.chars().next())
        .is_none_or(|next| !next.is_alphanumeric() && next != '_')
}
