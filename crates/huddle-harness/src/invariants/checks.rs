//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use super::{Invariant, InvariantResult, ReplyStatus, SessionSnapshot, Violation};

/// UI, client and store agree on the active room.
///
/// Responses for a room the user left must never leak into the store, so
/// the store always belongs to the client's active room, and holds nothing
/// when no room is open.
pub struct ActiveRoomAgrees;

impl Invariant for ActiveRoomAgrees {
    fn name(&self) -> &'static str {
        "active_room_agrees"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.app_room != state.client_room {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "app shows {:?} but client is in {:?}",
                    state.app_room, state.client_room
                ),
            });
        }

        match state.client_room {
            Some(room) if state.store_room != Some(room) => Err(Violation {
                invariant: self.name(),
                message: format!("store holds {:?} while room {room} is open", state.store_room),
            }),
            None if !state.entries.is_empty() => Err(Violation {
                invariant: self.name(),
                message: format!("{} messages stored with no room open", state.entries.len()),
            }),
            _ => Ok(()),
        }
    }
}

/// Stored and displayed messages are strictly ascending by id.
///
/// Strictly ascending means sorted with no duplicates, however pages, live
/// pushes and catch-ups interleaved.
pub struct MessagesOrderedUnique;

impl Invariant for MessagesOrderedUnique {
    fn name(&self) -> &'static str {
        "messages_ordered_unique"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for (what, ids) in [("store", state.store_ids()), ("view", state.view_ids.clone())] {
            if let Some(w) = ids.windows(2).find(|w| w[0] >= w[1]) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{what} has {} before {}", w[0], w[1]),
                });
            }
        }
        Ok(())
    }
}

/// The UI shows exactly the stored messages of the room it displays.
pub struct ViewMatchesStore;

impl Invariant for ViewMatchesStore {
    fn name(&self) -> &'static str {
        "view_matches_store"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.app_room.is_none() || state.app_room != state.store_room {
            return Ok(());
        }

        let store_ids = state.store_ids();
        if state.view_ids != store_ids {
            return Err(Violation {
                invariant: self.name(),
                message: format!("view {:?} != store {:?}", state.view_ids, store_ids),
            });
        }
        Ok(())
    }
}

/// Reply state is consistent with `reply_to`, and nothing waits forever.
///
/// - A message has a reply state exactly when it replies to something
/// - A resolved reply carries the message it points at
/// - Every pending target has a lookup in flight
pub struct RepliesConsistent;

impl Invariant for RepliesConsistent {
    fn name(&self) -> &'static str {
        "replies_consistent"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for entry in &state.entries {
            let ok = match (&entry.reply_to, &entry.reply) {
                (None, ReplyStatus::None) => true,
                (None, _) | (Some(_), ReplyStatus::None) => false,
                (Some(to), ReplyStatus::Resolved { target }) => to == target,
                (Some(_), ReplyStatus::Pending | ReplyStatus::Unavailable) => true,
            };
            if !ok {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "message {} replies to {:?} but is {:?}",
                        entry.id, entry.reply_to, entry.reply
                    ),
                });
            }
        }

        if !state.unrequested_targets.is_empty() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("targets {:?} pending with no lookup", state.unrequested_targets),
            });
        }
        Ok(())
    }
}
