//! End-to-end session behavior in simulation.
//!
//! # Test Strategy
//!
//! Each test drives the production runtime the way a user would:
//! 1. Type commands and messages (e.g. "/room 1", "/older")
//! 2. Let the simulated backend answer, possibly late or out of order
//! 3. Verify what the user would see
//!
//! # Oracle Pattern
//!
//! Tests end with oracle checks that verify:
//! - The UI shows exactly the active room's messages, in order
//! - Responses for rooms the user left never surface
//! - Reply previews settle to a quote or "unavailable"
//!
//! The standard invariants are checked after every runtime cycle.

use std::time::Duration;

use huddle_app::{AppEvent, KeyInput, NetworkEvent, ReplyPreview};
use huddle_client::{LinkState, PageKind, SessionConfig};
use huddle_harness::{Faults, SimBackend, Simulation};
use huddle_proto::{MessageId, MsgType, RoomId, SenderRef};

const ME: u64 = 42;

fn simulation(backend: SimBackend) -> Simulation {
    Simulation::new(7, backend, SessionConfig::new(ME))
}

fn view_ids(sim: &Simulation) -> Vec<MessageId> {
    sim.app().messages().iter().map(|m| m.id).collect()
}

fn reply_of(sim: &Simulation, id: MessageId) -> Option<ReplyPreview> {
    sim.app().messages().iter().find(|m| m.id == id).map(|m| m.reply.clone())
}

fn quoted(sim: &Simulation, id: MessageId) -> Option<MessageId> {
    match reply_of(sim, id)? {
        ReplyPreview::Quote { msg_id, .. } => Some(msg_id),
        _ => None,
    }
}

fn history_kinds(sim: &Simulation) -> Vec<PageKind> {
    sim.driver().history_requests().into_iter().map(|(kind, _)| kind).collect()
}

fn room_of(event: &NetworkEvent) -> Option<RoomId> {
    match event {
        NetworkEvent::LinkUp { room_id }
        | NetworkEvent::LinkDown { room_id, .. }
        | NetworkEvent::LiveMessage { room_id, .. }
        | NetworkEvent::HistoryLoaded { room_id, .. }
        | NetworkEvent::HistoryFailed { room_id, .. }
        | NetworkEvent::RosterLoaded { room_id, .. }
        | NetworkEvent::RosterFailed { room_id, .. } => Some(*room_id),
        NetworkEvent::RepliesLoaded { request, .. }
        | NetworkEvent::RepliesFailed { request, .. } => Some(request.room_id),
        NetworkEvent::TelemetryResult { .. } | NetworkEvent::Online | NetworkEvent::Offline => {
            None
        },
    }
}

#[tokio::test]
async fn opening_room_shows_newest_page() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 25);
    let mut sim = simulation(backend);

    sim.open_room(1).await.unwrap();

    assert_eq!(sim.app().link_state(), LinkState::Connected);
    assert_eq!(view_ids(&sim), ids[5..].to_vec());
    assert!(sim.app().has_more());
    assert_eq!(sim.driver().dials(), vec![1]);
}

#[tokio::test]
async fn older_pages_prepend_until_exhausted() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 25);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line("/older").await.unwrap();

    assert_eq!(view_ids(&sim), ids);
    assert!(!sim.app().has_more());
    let requests = sim.driver().history_requests();
    assert_eq!(requests[1].0, PageKind::Older);
    assert_eq!(requests[1].1.last_msg_id, Some(ids[5]));

    // Nothing older exists, so no further request goes out
    sim.type_line("/older").await.unwrap();
    assert_eq!(history_kinds(&sim), vec![PageKind::Initial, PageKind::Older]);
    assert_eq!(view_ids(&sim), ids);
}

#[tokio::test]
async fn malformed_entry_does_not_end_history() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 45);
    backend.corrupt(1, ids[30]);
    let mut sim = simulation(backend);

    sim.open_room(1).await.unwrap();

    assert_eq!(sim.app().messages().len(), 19);
    assert!(!view_ids(&sim).contains(&ids[30]));
    assert!(sim.app().has_more());

    sim.type_line("/older").await.unwrap();

    assert_eq!(sim.app().messages().len(), 39);
    assert_eq!(view_ids(&sim).first(), Some(&ids[5]));
    assert!(sim.app().has_more());
}

#[tokio::test]
async fn reopening_active_room_keeps_view() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 5);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line("/room 1").await.unwrap();

    assert_eq!(sim.app().link_state(), LinkState::Connected);
    assert_eq!(view_ids(&sim), ids);
    assert_eq!(sim.driver().dials(), vec![1]);
    assert_eq!(history_kinds(&sim), vec![PageKind::Initial]);
}

#[tokio::test]
async fn older_page_requested_once_while_in_flight() {
    let mut backend = SimBackend::new();
    backend.seed_room(1, 7, 60);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.driver().hold();
    sim.type_line("/older").await.unwrap();
    sim.type_line("/older").await.unwrap();

    assert_eq!(history_kinds(&sim), vec![PageKind::Initial, PageKind::Older]);

    sim.driver().release_all();
    sim.settle().await.unwrap();
    assert_eq!(sim.app().messages().len(), 40);
}

#[tokio::test]
async fn late_responses_for_previous_room_are_discarded() {
    let mut backend = SimBackend::new();
    backend.seed_room(1, 7, 12);
    let room_two = backend.seed_room(2, 8, 3);
    let mut sim = simulation(backend);

    sim.driver().hold();
    sim.open_room(1).await.unwrap();
    sim.type_line("/room 2").await.unwrap();

    // Room 2 answers first, room 1 answers afterwards
    sim.driver().release_where(|e| room_of(e) == Some(2));
    sim.settle().await.unwrap();
    sim.driver().release_all();
    sim.settle().await.unwrap();

    assert_eq!(sim.app().active_room(), Some(2));
    assert_eq!(sim.app().link_state(), LinkState::Connected);
    assert_eq!(view_ids(&sim), room_two);
    assert_eq!(sim.client().store().len(), 3);
}

#[tokio::test]
async fn reordered_responses_settle_to_same_view() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 30);
    let mut sim = simulation(backend);

    sim.driver().hold();
    sim.open_room(1).await.unwrap();
    sim.driver().release_reversed();
    sim.settle().await.unwrap();

    assert_eq!(sim.app().link_state(), LinkState::Connected);
    assert_eq!(view_ids(&sim), ids[10..].to_vec());
}

#[tokio::test]
async fn live_messages_of_other_rooms_are_ignored() {
    let mut backend = SimBackend::new();
    backend.seed_room(1, 7, 2);
    backend.seed_room(2, 7, 2);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();
    sim.type_line("/room 2").await.unwrap();

    // Room 1's link stays cached, so its traffic still arrives
    let stray = sim.driver().post(1, SenderRef::human(9), "elsewhere", None);
    let here = sim.driver().post(2, SenderRef::human(9), "here", None);
    sim.settle().await.unwrap();

    assert!(!view_ids(&sim).contains(&stray));
    assert_eq!(view_ids(&sim).last(), Some(&here));
}

#[tokio::test]
async fn leaving_room_releases_link_and_clears_view() {
    let mut backend = SimBackend::new();
    backend.seed_room(1, 7, 5);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line("/leave").await.unwrap();

    assert_eq!(sim.app().active_room(), None);
    assert!(sim.app().messages().is_empty());
    assert!(sim.driver().linked_rooms().is_empty());
}

#[tokio::test]
async fn reply_target_outside_page_is_looked_up() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 30);
    let reply = backend.post(1, SenderRef::human(9), "agreed".into(), Some(ids[2])).id;
    let mut sim = simulation(backend);

    sim.open_room(1).await.unwrap();

    match reply_of(&sim, reply) {
        Some(ReplyPreview::Quote { msg_id, excerpt, .. }) => {
            assert_eq!(msg_id, ids[2]);
            assert_eq!(excerpt, "seed 2");
        },
        other => panic!("expected quote, got {other:?}"),
    }
    // The looked-up target is not inserted into the conversation
    assert!(!view_ids(&sim).contains(&ids[2]));
    assert_eq!(sim.app().messages().len(), 20);
}

#[tokio::test]
async fn reply_target_in_page_resolves_without_lookup() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 5);
    let reply = backend.post(1, SenderRef::human(9), "agreed".into(), Some(ids[3])).id;
    let mut sim = simulation(backend);
    sim.driver().set_faults(Faults { replies: 1, ..Faults::default() });

    sim.open_room(1).await.unwrap();

    assert_eq!(quoted(&sim, reply), Some(ids[3]));
}

#[tokio::test]
async fn deleted_reply_target_is_unavailable() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 30);
    let reply = backend.post(1, SenderRef::human(9), "agreed".into(), Some(ids[2])).id;
    backend.delete(1, ids[2]);
    let mut sim = simulation(backend);

    sim.open_room(1).await.unwrap();

    assert_eq!(reply_of(&sim, reply), Some(ReplyPreview::Unavailable { msg_id: ids[2] }));
}

#[tokio::test]
async fn failed_lookup_is_unavailable_until_target_loads() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 30);
    let reply = backend.post(1, SenderRef::human(9), "agreed".into(), Some(ids[2])).id;
    let mut sim = simulation(backend);
    sim.driver().set_faults(Faults { replies: 1, ..Faults::default() });

    sim.open_room(1).await.unwrap();
    assert_eq!(reply_of(&sim, reply), Some(ReplyPreview::Unavailable { msg_id: ids[2] }));

    // Loading the page that holds the target upgrades the preview
    sim.type_line("/older").await.unwrap();
    assert_eq!(quoted(&sim, reply), Some(ids[2]));
}

#[tokio::test]
async fn live_reply_to_known_message_resolves_locally() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 3);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();
    sim.driver().set_faults(Faults { replies: 5, ..Faults::default() });

    let reply = sim.driver().post(1, SenderRef::human(9), "re", Some(ids[0]));
    sim.settle().await.unwrap();

    assert_eq!(quoted(&sim, reply), Some(ids[0]));
}

#[tokio::test]
async fn sent_message_arrives_through_broker() {
    let mut backend = SimBackend::new();
    let ids = backend.seed_room(1, 7, 3);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line(&format!("/reply {}", ids[1])).await.unwrap();
    sim.type_line("sounds good").await.unwrap();

    let sent = sim.driver().transmitted();
    assert_eq!(sent.len(), 1);
    let (room, frame) = &sent[0];
    assert_eq!(*room, 1);
    assert_eq!(frame.sender_id, ME);
    assert_eq!(frame.content, "sounds good");
    assert_eq!(frame.reply_to_msg_id, Some(ids[1]));
    assert_eq!(frame.msg_type, MsgType::Text);

    assert_eq!(sim.app().input_buffer(), "");
    assert_eq!(sim.app().replying_to(), None);
    let echoed = sim.app().messages().last().unwrap();
    assert_eq!(echoed.content, "sounds good");
    assert_eq!(quoted(&sim, echoed.id), Some(ids[1]));
}

#[tokio::test]
async fn mention_addresses_bot_and_answer_resolves_locally() {
    let mut backend = SimBackend::new().with_bot_replies();
    backend.seed_room(1, 7, 2);
    backend.add_member(1, ME, "Me");
    backend.add_bot(1, 8, "Tutor");
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();
    sim.driver().set_faults(Faults { replies: 5, ..Faults::default() });

    sim.type_line("@tutor what is ownership").await.unwrap();

    let (_, frame) = &sim.driver().transmitted()[0];
    assert_eq!(frame.bot_id, Some(8));
    assert_eq!(frame.msg_type, MsgType::Bot);

    let messages = sim.app().messages();
    let question = &messages[messages.len() - 2];
    let answer = &messages[messages.len() - 1];
    assert_eq!(question.sender, "Me");
    assert!(answer.is_bot);
    assert_eq!(answer.sender, "Tutor");
    assert_eq!(quoted(&sim, answer.id), Some(question.id));
}

#[tokio::test]
async fn selected_bot_wins_over_plain_text() {
    let mut backend = SimBackend::new();
    backend.add_bot(1, 8, "Tutor");
    backend.add_bot(1, 9, "Grader");
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line("/bot grader").await.unwrap();
    assert_eq!(sim.app().selected_bot(), Some("grader"));
    sim.type_line("please check @tutor").await.unwrap();

    let (_, frame) = &sim.driver().transmitted()[0];
    assert_eq!(frame.bot_id, Some(9));
    // Selection is cleared once sent
    assert_eq!(sim.app().selected_bot(), None);
}

#[tokio::test]
async fn unknown_bot_is_reported() {
    let mut backend = SimBackend::new();
    backend.add_bot(1, 8, "Tutor");
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();

    sim.type_line("/bot nobody").await.unwrap();

    assert_eq!(sim.app().selected_bot(), None);
    assert!(sim.app().status_message().is_some_and(|s| s.starts_with("Error")));
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let mut sim = simulation(SimBackend::new());
    sim.open_room(1).await.unwrap();

    sim.type_line("   ").await.unwrap();

    assert!(sim.driver().transmitted().is_empty());
}

#[tokio::test]
async fn message_while_disconnected_keeps_input() {
    let mut backend = SimBackend::new();
    backend.seed_room(1, 7, 2);
    let mut sim = simulation(backend);
    sim.open_room(1).await.unwrap();
    sim.driver().drop_link(1, "socket closed");
    sim.settle().await.unwrap();

    sim.type_line("hello?").await.unwrap();

    assert!(sim.driver().transmitted().is_empty());
    assert_eq!(sim.app().input_buffer(), "hello?");
    assert!(sim.app().status_message().is_some_and(|s| s.starts_with("Error")));
}

#[tokio::test]
async fn typing_is_batched_on_interval() {
    let mut sim = simulation(SimBackend::new());
    sim.open_room(1).await.unwrap();

    sim.driver().type_keys("draft");
    sim.settle().await.unwrap();
    assert!(sim.driver().telemetry_batches().is_empty());

    sim.advance(Duration::from_secs(10)).await.unwrap();

    assert_eq!(sim.driver().telemetry_batches(), vec![(1, 1)]);
    assert!(sim.driver().telemetry_events().is_empty());
}

#[tokio::test]
async fn rejected_batch_retries_then_falls_back_to_single_events() {
    let mut sim = simulation(SimBackend::new());
    sim.open_room(1).await.unwrap();
    sim.driver().set_faults(Faults { telemetry: 3, ..Faults::default() });

    sim.driver().type_keys("draft");
    sim.settle().await.unwrap();
    sim.run_for(Duration::from_secs(16), Duration::from_millis(500)).await.unwrap();

    assert_eq!(sim.driver().telemetry_batches(), vec![(1, 1), (1, 2), (1, 3)]);
    let singles = sim.driver().telemetry_events();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].content, "draft");
    assert_eq!(singles[0].group_id, 1);
    assert_eq!(singles[0].user_id, ME);
}

#[tokio::test]
async fn sending_flushes_typing_telemetry() {
    let mut sim = simulation(SimBackend::new());
    sim.open_room(1).await.unwrap();

    sim.type_line("hi all").await.unwrap();

    assert_eq!(sim.driver().telemetry_batches(), vec![(1, 1)]);
    assert_eq!(sim.driver().transmitted().len(), 1);
}

#[tokio::test]
async fn quitting_flushes_and_releases_everything() {
    let mut sim = simulation(SimBackend::new());
    sim.open_room(1).await.unwrap();
    sim.type_line("/room 2").await.unwrap();
    sim.driver().type_keys("half typed");
    sim.driver().inject_event(AppEvent::Key(KeyInput::Esc));
    sim.settle().await.unwrap();

    assert!(sim.has_quit());
    assert!(sim.driver().is_stopped());
    assert!(sim.driver().linked_rooms().is_empty());
    assert_eq!(sim.driver().telemetry_batches().len(), 1);
}
