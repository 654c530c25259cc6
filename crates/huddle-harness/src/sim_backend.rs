//! In-memory chat backend for simulation.
//!
//! Answers history, batch lookup and roster requests the way the HTTP API
//! does, and accepts published frames the way the broker does. Message ids
//! come from one counter, so they are unique and increase across rooms.

use std::collections::{BTreeMap, BTreeSet};

use huddle_proto::{
    BotId, HistoryQuery, Message, MessageId, MsgType, OutboundFrame, RoomId, SenderRef, UserId,
    api::{BotProfile, DecodedPage, HistoryPage, MemberProfile},
};

#[derive(Debug, Clone, Default)]
struct RoomData {
    messages: BTreeMap<MessageId, Message>,
    /// Served with a sender type clients do not know
    corrupt: BTreeSet<MessageId>,
    members: Vec<MemberProfile>,
    bots: Vec<BotProfile>,
}

/// Server-side state of every room.
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    rooms: BTreeMap<RoomId, RoomData>,
    next_id: MessageId,
    bot_replies: bool,
}

impl SimBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make addressed bots answer every message sent to them.
    #[must_use]
    pub fn with_bot_replies(mut self) -> Self {
        self.bot_replies = true;
        self
    }

    /// Add `count` messages by `author` to the room. Returns their ids.
    pub fn seed_room(&mut self, room_id: RoomId, author: UserId, count: usize) -> Vec<MessageId> {
        (0..count)
            .map(|i| self.post(room_id, SenderRef::human(author), format!("seed {i}"), None).id)
            .collect()
    }

    /// Store a message as if someone else sent it.
    pub fn post(
        &mut self,
        room_id: RoomId,
        sender: SenderRef,
        content: String,
        reply_to: Option<MessageId>,
    ) -> Message {
        self.next_id += 1;
        let message = Message {
            id: self.next_id,
            room_id,
            sender,
            content,
            created_at: self.next_id,
            reply_to,
            msg_type: if sender.is_bot() { MsgType::Bot } else { MsgType::Text },
        };
        self.room(room_id).messages.insert(message.id, message.clone());
        message
    }

    /// Store a published frame. Returns the stored message followed by any
    /// bot answer.
    pub fn accept(&mut self, frame: &OutboundFrame) -> Vec<Message> {
        self.next_id += 1;
        let message = Message {
            id: self.next_id,
            room_id: frame.group_id,
            sender: SenderRef::human(frame.sender_id),
            content: frame.content.clone(),
            created_at: frame.create_time,
            reply_to: frame.reply_to_msg_id,
            msg_type: frame.msg_type,
        };
        self.room(frame.group_id).messages.insert(message.id, message.clone());

        let mut stored = vec![message];
        if self.bot_replies
            && let Some(bot_id) = frame.bot_id
        {
            let question = stored[0].id;
            let answer = format!("answer to #{question}");
            stored.push(self.post(frame.group_id, SenderRef::bot(bot_id), answer, Some(question)));
        }
        stored
    }

    /// Remove a message, so lookups no longer find it.
    pub fn delete(&mut self, room_id: RoomId, id: MessageId) -> bool {
        self.rooms.get_mut(&room_id).is_some_and(|room| room.messages.remove(&id).is_some())
    }

    /// Serve a stored message with an unknown sender type from now on.
    pub fn corrupt(&mut self, room_id: RoomId, id: MessageId) {
        self.room(room_id).corrupt.insert(id);
    }

    /// Register a human member.
    pub fn add_member(&mut self, room_id: RoomId, user_id: UserId, name: &str) {
        self.room(room_id).members.push(MemberProfile { user_id, name: name.into(), avatar: None });
    }

    /// Register a chatbot.
    pub fn add_bot(&mut self, room_id: RoomId, bot_id: BotId, name: &str) {
        self.room(room_id).bots.push(BotProfile { bot_id, name: name.into(), avatar: None });
    }

    /// Newest page of messages older than the cursor, newest first.
    pub fn history(&self, query: &HistoryQuery) -> Vec<Message> {
        let Some(room) = self.rooms.get(&query.room_id) else {
            return Vec::new();
        };
        let upper = query.last_msg_id.unwrap_or(MessageId::MAX);
        room.messages.range(..upper).rev().take(query.page_size).map(|(_, m)| m.clone()).collect()
    }

    /// History page as a client decodes it off the wire. Corrupted entries
    /// count toward `returned` but are dropped.
    pub fn history_page(&self, query: &HistoryQuery) -> DecodedPage {
        let messages = self.history(query);
        let Ok(mut page) = HistoryPage::from_messages(&messages) else {
            return DecodedPage::default();
        };

        if let Some(room) = self.rooms.get(&query.room_id) {
            for (entry, message) in page.messages.iter_mut().zip(&messages) {
                if room.corrupt.contains(&message.id) {
                    entry["senderType"] = "SYSTEM".into();
                }
            }
        }
        page.decode()
    }

    /// Messages of the room with the given ids. Unknown ids are skipped.
    pub fn messages_by_id(&self, room_id: RoomId, ids: &[MessageId]) -> Vec<Message> {
        let Some(room) = self.rooms.get(&room_id) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| room.messages.get(id).cloned()).collect()
    }

    /// Members and bots of the room.
    pub fn roster(&self, room_id: RoomId) -> (Vec<MemberProfile>, Vec<BotProfile>) {
        self.rooms
            .get(&room_id)
            .map(|room| (room.members.clone(), room.bots.clone()))
            .unwrap_or_default()
    }

    /// Every stored message of the room, ascending.
    pub fn all_messages(&self, room_id: RoomId) -> Vec<Message> {
        self.rooms.get(&room_id).map(|r| r.messages.values().cloned().collect()).unwrap_or_default()
    }

    fn room(&mut self, room_id: RoomId) -> &mut RoomData {
        self.rooms.entry(room_id).or_default()
    }
}
