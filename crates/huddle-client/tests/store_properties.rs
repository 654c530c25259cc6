//! Property-based tests for message merging.
//!
//! History pages, live pushes and reply lookups may arrive in any order and
//! any number of times. The store must end up with each message exactly once,
//! in id order, with every reply whose target is known resolved.

use huddle_client::{MessageStore, PageKind, ReplyState, StoredMessage, Viewport};
use huddle_proto::{Message, MessageId, MsgType, RoomId, SenderRef};
use proptest::prelude::*;

const ROOM: RoomId = 9;
const COUNT: u64 = 40;

fn reply_target(id: MessageId) -> Option<MessageId> {
    (id % 3 == 0).then_some(id / 2)
}

fn msg(id: MessageId) -> Message {
    Message {
        id,
        room_id: ROOM,
        sender: SenderRef::human(id % 4),
        content: format!("m{id}"),
        created_at: id * 1000,
        reply_to: reply_target(id),
        msg_type: MsgType::Text,
    }
}

#[derive(Debug, Clone)]
enum Delivery {
    Live(MessageId),
    Page(PageKind, MessageId, u64),
}

fn delivery() -> impl Strategy<Value = Delivery> {
    prop_oneof![
        (1..=COUNT).prop_map(Delivery::Live),
        (1..=COUNT, 1u64..8).prop_map(|(start, len)| Delivery::Page(PageKind::Older, start, len)),
        (1..=COUNT, 1u64..8).prop_map(|(start, len)| Delivery::Page(PageKind::CatchUp, start, len)),
    ]
}

fn deliver(store: &mut MessageStore, delivery: &Delivery) {
    match *delivery {
        Delivery::Live(id) => {
            let _ = store.ingest_live(msg(id), Viewport::AT_BOTTOM);
        },
        Delivery::Page(kind, start, len) => {
            let end = (start + len).min(COUNT + 1);
            // Pages arrive newest first
            let page = (start..end).rev().map(msg).collect();
            let _ = store.ingest_history_page(kind, page);
        },
    }
}

fn snapshot(store: &MessageStore) -> Vec<StoredMessage> {
    store.messages().cloned().collect()
}

proptest! {
    #[test]
    fn any_interleaving_yields_each_message_once(
        deliveries in prop::collection::vec(delivery(), 0..60),
        tail in prop::collection::vec(1..=COUNT, 0..20),
    ) {
        let mut store = MessageStore::new(20);
        store.switch_room(ROOM);

        for d in &deliveries {
            deliver(&mut store, d);
        }
        for id in 1..=COUNT {
            deliver(&mut store, &Delivery::Live(id));
        }
        for id in tail {
            deliver(&mut store, &Delivery::Live(id));
        }

        let expected: Vec<_> = (1..=COUNT).collect();
        prop_assert_eq!(store.ids(), expected);

        for entry in store.messages() {
            match reply_target(entry.id()) {
                Some(target) => prop_assert_eq!(
                    entry.reply().target().map(|m| m.id),
                    Some(target),
                    "message {} should resolve its reply", entry.id()
                ),
                None => prop_assert_eq!(entry.reply(), &ReplyState::None),
            }
        }
        prop_assert!(store.pending_targets().is_empty());
    }

    #[test]
    fn merge_order_does_not_matter(
        mut ids in prop::collection::vec(1..=COUNT, 1..80),
    ) {
        let mut forward = MessageStore::new(20);
        forward.switch_room(ROOM);
        for &id in &ids {
            let _ = forward.ingest_live(msg(id), Viewport::AT_BOTTOM);
        }

        ids.reverse();
        let mut backward = MessageStore::new(20);
        backward.switch_room(ROOM);
        let _ = backward.ingest_history_page(PageKind::Older, ids.iter().copied().map(msg).collect());

        prop_assert_eq!(snapshot(&forward), snapshot(&backward));
    }

    #[test]
    fn repeated_resolution_equals_single(
        found in prop::collection::btree_set(100u64..106, 0..6),
        repeats in 2usize..4,
    ) {
        let replies: Vec<Message> = (0..6u64)
            .map(|i| Message { reply_to: Some(100 + i), ..msg(1 + i) })
            .collect();
        let requested: Vec<MessageId> = (100..106).collect();
        let targets: Vec<Message> =
            found.iter().map(|&id| Message { reply_to: None, ..msg(id) }).collect();

        let mut once = MessageStore::new(20);
        once.switch_room(ROOM);
        let _ = once.ingest_history_page(PageKind::Initial, replies.clone());
        let _ = once.apply_resolution(&requested, targets.clone());

        let mut many = MessageStore::new(20);
        many.switch_room(ROOM);
        let _ = many.ingest_history_page(PageKind::Initial, replies);
        for _ in 0..repeats {
            let _ = many.apply_resolution(&requested, targets.clone());
        }

        prop_assert_eq!(snapshot(&once), snapshot(&many));
        for entry in once.messages() {
            let target = entry.message().reply_to.unwrap();
            if found.contains(&target) {
                prop_assert_eq!(entry.reply().target().map(|m| m.id), Some(target));
            } else {
                prop_assert_eq!(entry.reply(), &ReplyState::Unavailable);
            }
        }
    }
}
