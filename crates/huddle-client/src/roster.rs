//! Room members and bots.
//!
//! Profiles are cached per room and survive room switches. [`Roster::resolve`]
//! is the one place a message author becomes a display name and avatar.

use std::collections::HashMap;

use huddle_proto::{
    BotId, RoomId, SenderKind, SenderRef, UserId,
    api::{BotProfile, MemberProfile},
};

/// Display data for a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Name shown next to messages.
    pub display_name: String,
    /// Avatar URL.
    pub avatar: Option<String>,
}

/// A resolved message author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// Human room member.
    User {
        /// User ID.
        id: UserId,
        /// Display data.
        profile: Profile,
    },
    /// Chatbot.
    Bot {
        /// Bot ID.
        id: BotId,
        /// Display data.
        profile: Profile,
    },
}

impl Sender {
    /// Name shown next to messages.
    pub fn display_name(&self) -> &str {
        &self.profile().display_name
    }

    /// Avatar URL.
    pub fn avatar(&self) -> Option<&str> {
        self.profile().avatar.as_deref()
    }

    /// True for chatbots.
    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot { .. })
    }

    fn profile(&self) -> &Profile {
        match self {
            Self::User { profile, .. } | Self::Bot { profile, .. } => profile,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RoomRoster {
    members: HashMap<UserId, Profile>,
    /// Listing order is kept for mention matching
    bots: Vec<(BotId, Profile)>,
}

/// Room-scoped member and bot caches.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    rooms: HashMap<RoomId, RoomRoster>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if profiles for the room are cached.
    pub fn has_room(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// Replace the room's cached profiles.
    pub fn load(&mut self, room_id: RoomId, members: Vec<MemberProfile>, bots: Vec<BotProfile>) {
        let members = members
            .into_iter()
            .map(|m| (m.user_id, Profile { display_name: m.name, avatar: m.avatar }))
            .collect();
        let bots = bots
            .into_iter()
            .map(|b| (b.bot_id, Profile { display_name: b.name, avatar: b.avatar }))
            .collect();

        self.rooms.insert(room_id, RoomRoster { members, bots });
    }

    /// Drop every cached room (logout).
    pub fn clear(&mut self) {
        self.rooms.clear();
    }

    /// Resolve a message author to display data.
    ///
    /// Unknown authors get a placeholder name.
    pub fn resolve(&self, room_id: RoomId, sender: SenderRef) -> Sender {
        let room = self.rooms.get(&room_id);

        match sender.kind {
            SenderKind::Human => {
                let profile = room
                    .and_then(|r| r.members.get(&sender.id))
                    .cloned()
                    .unwrap_or_else(|| placeholder("User", sender.id));
                Sender::User { id: sender.id, profile }
            },
            SenderKind::Bot => {
                let profile = room
                    .and_then(|r| r.bots.iter().find(|(id, _)| *id == sender.id))
                    .map(|(_, p)| p.clone())
                    .unwrap_or_else(|| placeholder("Bot", sender.id));
                Sender::Bot { id: sender.id, profile }
            },
        }
    }

    /// Bots of the room as `(id, name)`, in listing order.
    pub fn bots(&self, room_id: RoomId) -> Vec<(BotId, &str)> {
        self.rooms
            .get(&room_id)
            .map(|r| r.bots.iter().map(|(id, p)| (*id, p.display_name.as_str())).collect())
            .unwrap_or_default()
    }

    /// Find a room bot by name, ignoring case.
    pub fn bot_by_name(&self, room_id: RoomId, name: &str) -> Option<BotId> {
        self.rooms.get(&room_id)?.bots.iter().find_map(|(id, profile)| {
            profile.display_name.eq_ignore_ascii_case(name.trim()).then_some(*id)
        })
    }
}

fn placeholder(kind: &str, id: u64) -> Profile {
    Profile { display_name: format!("{kind} {id}"), avatar: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        let mut roster = Roster::new();
        roster.load(
            3,
            vec![MemberProfile { user_id: 42, name: "Ada".into(), avatar: Some("a.png".into()) }],
            vec![BotProfile { bot_id: 8, name: "Tutor".into(), avatar: None }],
        );
        roster
    }

    #[test]
    fn resolves_known_members_and_bots() {
        let roster = roster();

        let user = roster.resolve(3, SenderRef::human(42));
        assert_eq!(user.display_name(), "Ada");
        assert_eq!(user.avatar(), Some("a.png"));
        assert!(!user.is_bot());

        let bot = roster.resolve(3, SenderRef::bot(8));
        assert_eq!(bot.display_name(), "Tutor");
        assert!(bot.is_bot());
    }

    #[test]
    fn unknown_senders_get_placeholders() {
        let roster = roster();
        assert_eq!(roster.resolve(3, SenderRef::human(1)).display_name(), "User 1");
        assert_eq!(roster.resolve(9, SenderRef::bot(8)).display_name(), "Bot 8");
    }

    #[test]
    fn bot_names_match_case_insensitively() {
        let roster = roster();
        assert_eq!(roster.bot_by_name(3, "tutor"), Some(8));
        assert_eq!(roster.bot_by_name(3, "tut"), None);
        assert_eq!(roster.bot_by_name(4, "tutor"), None);
    }

    #[test]
    fn user_and_bot_ids_do_not_collide() {
        let roster = roster();
        assert_eq!(roster.resolve(3, SenderRef::bot(42)).display_name(), "Bot 42");
    }
}
