//! Observable message view types.
//!
//! View models for rendering the active room. They hold display-ready data
//! (resolved sender names, reply previews) so renderers never touch the
//! protocol client.

use huddle_client::{ReplyState, Roster, StoredMessage};
use huddle_proto::{MessageId, RoomId};

/// Characters of a replied-to message shown in a preview.
pub const EXCERPT_CHARS: usize = 60;

/// How the replied-to message is shown above a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPreview {
    /// Not a reply.
    None,
    /// Target is being fetched.
    Loading {
        /// Replied-to message.
        msg_id: MessageId,
    },
    /// Target is known.
    Quote {
        /// Replied-to message.
        msg_id: MessageId,
        /// Author display name.
        sender: String,
        /// Start of the content.
        excerpt: String,
    },
    /// Target could not be found.
    Unavailable {
        /// Replied-to message.
        msg_id: MessageId,
    },
}

/// A message ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    /// Message ID.
    pub id: MessageId,
    /// Author display name.
    pub sender: String,
    /// Author is a chatbot.
    pub is_bot: bool,
    /// Text content.
    pub content: String,
    /// Creation time in Unix milliseconds.
    pub created_at: u64,
    /// Replied-to message preview.
    pub reply: ReplyPreview,
}

impl MessageView {
    /// Build the view of a stored message, resolving names from the roster.
    pub fn from_stored(room_id: RoomId, entry: &StoredMessage, roster: &Roster) -> Self {
        let message = entry.message();
        let sender = roster.resolve(room_id, message.sender);

        let reply = match (message.reply_to, entry.reply()) {
            (None, _) => ReplyPreview::None,
            (Some(msg_id), ReplyState::Resolved(target)) => ReplyPreview::Quote {
                msg_id,
                sender: roster.resolve(room_id, target.sender).display_name().to_string(),
                excerpt: excerpt(&target.content),
            },
            (Some(msg_id), ReplyState::Unavailable) => ReplyPreview::Unavailable { msg_id },
            (Some(msg_id), ReplyState::Pending | ReplyState::None) => {
                ReplyPreview::Loading { msg_id }
            },
        };

        Self {
            id: message.id,
            sender: sender.display_name().to_string(),
            is_bot: sender.is_bot(),
            content: message.content.clone(),
            created_at: message.created_at,
            reply,
        }
    }
}

fn excerpt(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() { format!("{head}…") } else { head }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_content_is_cut() {
        let text = "x".repeat(EXCERPT_CHARS + 5);
        let cut = excerpt(&text);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short"), "short");
    }
}
