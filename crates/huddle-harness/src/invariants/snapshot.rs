//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use huddle_app::App;
use huddle_client::{Client, Environment, ReplyState};
use huddle_proto::{MessageId, RoomId};
use serde::Serialize;

/// Reply resolution as observed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Not a reply.
    None,
    /// Waiting for the target.
    Pending,
    /// Target attached.
    Resolved {
        /// Attached message.
        target: MessageId,
    },
    /// Target given up on.
    Unavailable,
}

impl From<&ReplyState> for ReplyStatus {
    fn from(state: &ReplyState) -> Self {
        match state {
            ReplyState::None => Self::None,
            ReplyState::Pending => Self::Pending,
            ReplyState::Resolved(target) => Self::Resolved { target: target.id },
            ReplyState::Unavailable => Self::Unavailable,
        }
    }
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    /// Message id.
    pub id: MessageId,
    /// Replied-to message.
    pub reply_to: Option<MessageId>,
    /// Resolution of `reply_to`.
    pub reply: ReplyStatus,
}

/// Snapshot of one session: the UI state and the client behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Room the UI shows.
    pub app_room: Option<RoomId>,
    /// Room the client considers active.
    pub client_room: Option<RoomId>,
    /// Room the store holds messages for.
    pub store_room: Option<RoomId>,
    /// Link state of the active room.
    pub link_state: String,
    /// Message ids the UI shows, in display order.
    pub view_ids: Vec<MessageId>,
    /// Stored messages, in store order.
    pub entries: Vec<EntrySnapshot>,
    /// Store believes older history exists.
    pub has_more: bool,
    /// Pending reply targets with no lookup in flight.
    pub unrequested_targets: Vec<MessageId>,
}

impl SessionSnapshot {
    /// Empty snapshot (no room anywhere).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the observable state of an App and its Client.
    pub fn capture<E: Environment>(app: &App, client: &Client<E>) -> Self {
        let store = client.store();
        let entries = store
            .messages()
            .map(|entry| EntrySnapshot {
                id: entry.id(),
                reply_to: entry.message().reply_to,
                reply: entry.reply().into(),
            })
            .collect();
        let unrequested_targets = store
            .pending_targets()
            .into_iter()
            .filter(|id| !client.resolver().is_in_flight(*id))
            .collect();

        Self {
            app_room: app.active_room(),
            client_room: client.active_room(),
            store_room: store.room_id(),
            link_state: client.link_state().to_string(),
            view_ids: app.messages().iter().map(|m| m.id).collect(),
            entries,
            has_more: store.has_more(),
            unrequested_targets,
        }
    }

    /// Stored message ids, in store order.
    pub fn store_ids(&self) -> Vec<MessageId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}
