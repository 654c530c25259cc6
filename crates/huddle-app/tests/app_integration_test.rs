//! Integration tests for App, Bridge and Runtime behavior.
//!
//! # Oracle Pattern
//!
//! Tests end with oracle checks that verify:
//! - App state reflects the session state
//! - I/O effects go to the right room
//! - Responses for a room the user left never reach the view

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use huddle_app::{
    App, AppAction, AppEvent, Bridge, Driver, Effect, KeyInput, NetworkEvent, ReplyPreview, Runtime,
};
use huddle_client::{BatchRequest, Environment, LinkState, PageKind, SessionConfig, Viewport};
use huddle_core::env::test_utils::MockEnv;
use huddle_proto::{
    HistoryQuery, Message, MsgType, OutboundFrame, RoomId, SenderRef, api::TrackedEvent,
};

fn msg(room_id: RoomId, id: u64, reply_to: Option<u64>) -> Message {
    Message {
        id,
        room_id,
        sender: SenderRef::human(7),
        content: format!("message {id}"),
        created_at: id,
        reply_to,
        msg_type: MsgType::Text,
    }
}

/// Process actions from App through Bridge and update App state.
fn process_actions<E: Environment>(
    app: &mut App,
    bridge: &mut Bridge<E>,
    actions: Vec<AppAction>,
) -> Vec<Effect> {
    let mut pending: VecDeque<AppAction> = actions.into();
    while let Some(action) = pending.pop_front() {
        match action {
            AppAction::Render | AppAction::Quit => {},
            other => {
                for event in bridge.process_app_action(other) {
                    pending.extend(app.handle(event));
                }
            },
        }
    }
    bridge.take_effects()
}

/// Feed a network result through Bridge into App.
fn deliver<E: Environment>(
    app: &mut App,
    bridge: &mut Bridge<E>,
    event: NetworkEvent,
) -> Vec<Effect> {
    let viewport = app.viewport();
    let mut actions = Vec::new();
    for event in bridge.handle_network(event, viewport) {
        actions.extend(app.handle(event));
    }
    let mut effects = bridge.take_effects();
    effects.extend(process_actions(app, bridge, actions));
    effects
}

fn type_line<E: Environment>(app: &mut App, bridge: &mut Bridge<E>, line: &str) -> Vec<Effect> {
    let mut effects = Vec::new();
    for key in KeyInput::line(line) {
        let actions = app.handle(AppEvent::Key(key));
        effects.extend(process_actions(app, bridge, actions));
    }
    effects
}

fn setup() -> (App, Bridge<MockEnv>) {
    (App::new(), Bridge::new(MockEnv::new(), SessionConfig::new(42)))
}

fn history_queries(effects: &[Effect]) -> Vec<(PageKind, HistoryQuery)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::FetchHistory { kind, query } => Some((*kind, query.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn room_command_connects_and_shows_history() {
    let (mut app, mut bridge) = setup();

    let effects = type_line(&mut app, &mut bridge, "/room 3");
    assert!(effects.contains(&Effect::Dial { room_id: 3 }));
    assert_eq!(app.link_state(), LinkState::Connecting);

    let _ = deliver(&mut app, &mut bridge, NetworkEvent::LinkUp { room_id: 3 });
    let _ = deliver(&mut app, &mut bridge, NetworkEvent::HistoryLoaded {
        room_id: 3,
        kind: PageKind::Initial,
        returned: 20,
        messages: (1..=20).rev().map(|id| msg(3, id, None)).collect(),
    });

    // Oracle: view is ascending and knows more history exists
    assert_eq!(app.link_state(), LinkState::Connected);
    let ids: Vec<_> = app.messages().iter().map(|m| m.id).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    assert!(app.has_more());
}

#[test]
fn typed_message_is_transmitted_with_reply() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");
    let _ = deliver(&mut app, &mut bridge, NetworkEvent::LinkUp { room_id: 3 });
    let _ = type_line(&mut app, &mut bridge, "/reply 11");

    let effects = type_line(&mut app, &mut bridge, "sounds good");

    let frame = effects.iter().find_map(|e| match e {
        Effect::Transmit { room_id: 3, frame } => Some(frame.clone()),
        _ => None,
    });
    let frame = frame.expect("message transmitted");
    assert_eq!(frame.content, "sounds good");
    assert_eq!(frame.reply_to_msg_id, Some(11));

    // Oracle: compose state is reset after a successful send
    assert!(app.input_buffer().is_empty());
    assert_eq!(app.replying_to(), None);
}

#[test]
fn message_typed_while_connecting_stays_in_input() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");

    let effects = type_line(&mut app, &mut bridge, "hello");

    assert!(!effects.iter().any(|e| matches!(e, Effect::Transmit { .. })));
    assert_eq!(app.input_buffer(), "hello");
    assert!(app.status_message().is_some_and(|s| s.starts_with("Error")));
}

#[test]
fn late_history_for_previous_room_is_ignored() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 1");
    let _ = type_line(&mut app, &mut bridge, "/room 2");

    let _ = deliver(&mut app, &mut bridge, NetworkEvent::HistoryLoaded {
        room_id: 1,
        kind: PageKind::Initial,
        returned: 1,
        messages: vec![msg(1, 5, None)],
    });

    // Oracle: room 2 view stays empty
    assert_eq!(app.active_room(), Some(2));
    assert!(app.messages().is_empty());
    assert!(bridge.client().store().is_empty());
}

#[test]
fn scrolling_to_top_requests_older_page() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");
    let _ = deliver(&mut app, &mut bridge, NetworkEvent::HistoryLoaded {
        room_id: 3,
        kind: PageKind::Initial,
        returned: 20,
        messages: (21..=40).map(|id| msg(3, id, None)).collect(),
    });

    let mut effects = Vec::new();
    for _ in 0..20 {
        let actions = app.handle(AppEvent::Key(KeyInput::Up));
        effects.extend(process_actions(&mut app, &mut bridge, actions));
    }

    let queries = history_queries(&effects);
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0, PageKind::Older);
    assert_eq!(queries[0].1.last_msg_id, Some(21));
}

#[test]
fn reply_preview_follows_lookup() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");

    let effects = deliver(&mut app, &mut bridge, NetworkEvent::HistoryLoaded {
        room_id: 3,
        kind: PageKind::Initial,
        returned: 1,
        messages: vec![msg(3, 30, Some(2))],
    });
    let request = effects.into_iter().find_map(|e| match e {
        Effect::FetchReplies(request) => Some(request),
        _ => None,
    });
    let request = request.expect("lookup scheduled");
    assert_eq!(request.msg_ids, vec![2]);
    assert!(matches!(app.messages()[0].reply, ReplyPreview::Loading { msg_id: 2 }));

    let _ = deliver(&mut app, &mut bridge, NetworkEvent::RepliesLoaded {
        request,
        messages: vec![msg(3, 2, None)],
    });

    // Oracle: preview is resolved and the target is not shown as a message
    assert!(matches!(
        &app.messages()[0].reply,
        ReplyPreview::Quote { msg_id: 2, excerpt, .. } if excerpt == "message 2"
    ));
    assert_eq!(app.messages().len(), 1);
}

#[test]
fn live_message_while_scrolled_up_sets_indicator() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");
    let _ = deliver(&mut app, &mut bridge, NetworkEvent::HistoryLoaded {
        room_id: 3,
        kind: PageKind::Initial,
        returned: 40,
        messages: (1..=40).map(|id| msg(3, id, None)).collect(),
    });
    for _ in 0..15 {
        let _ = app.handle(AppEvent::Key(KeyInput::Up));
    }

    let _ = deliver(&mut app, &mut bridge, NetworkEvent::LiveMessage {
        room_id: 3,
        message: msg(3, 41, None),
    });

    assert!(app.has_new_messages());
    assert_eq!(app.scroll_offset(), 15);
}

#[test]
fn leave_releases_room_link() {
    let (mut app, mut bridge) = setup();
    let _ = type_line(&mut app, &mut bridge, "/room 3");

    let effects = type_line(&mut app, &mut bridge, "/leave");

    assert!(effects.contains(&Effect::Release { room_id: Some(3) }));
    assert_eq!(app.active_room(), None);
}

#[derive(Debug, thiserror::Error)]
enum FakeError {
    #[error("dial refused")]
    DialRefused,
}

/// Driver that replays scripted input and records every request.
#[derive(Default)]
struct FakeDriver {
    env: MockEnv,
    inputs: VecDeque<AppEvent>,
    network: VecDeque<NetworkEvent>,
    refuse_dial: bool,
    dialed: Vec<RoomId>,
    transmitted: Vec<(RoomId, OutboundFrame)>,
    released: Arc<Mutex<Vec<Option<RoomId>>>>,
    history: Vec<(PageKind, HistoryQuery)>,
    telemetry: Vec<TrackedEvent>,
    renders: usize,
    stopped: Arc<AtomicBool>,
}

impl FakeDriver {
    fn typing(line: &str) -> impl Iterator<Item = AppEvent> + '_ {
        KeyInput::line(line).map(AppEvent::Key)
    }
}

impl Driver for FakeDriver {
    type Error = FakeError;
    type Instant = std::time::Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        Ok(self.inputs.pop_front())
    }

    async fn poll_network(&mut self) -> Option<NetworkEvent> {
        self.network.pop_front()
    }

    async fn dial(&mut self, room_id: RoomId) -> Result<(), Self::Error> {
        if self.refuse_dial {
            return Err(FakeError::DialRefused);
        }
        self.dialed.push(room_id);
        Ok(())
    }

    async fn transmit(&mut self, room_id: RoomId, frame: OutboundFrame) -> Result<(), Self::Error> {
        self.transmitted.push((room_id, frame));
        Ok(())
    }

    fn release(&mut self, room_id: Option<RoomId>) {
        self.released.lock().unwrap().push(room_id);
    }

    fn fetch_history(&mut self, kind: PageKind, query: HistoryQuery) {
        self.history.push((kind, query));
    }

    fn fetch_replies(&mut self, _request: BatchRequest) {}

    fn fetch_roster(&mut self, _room_id: RoomId) {}

    fn submit_telemetry(&mut self, _batch_id: u64, events: Vec<TrackedEvent>, _attempt: u32) {
        self.telemetry.extend(events);
    }

    fn submit_telemetry_event(&mut self, event: TrackedEvent) {
        self.telemetry.push(event);
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, _app: &App) -> Result<(), Self::Error> {
        self.renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn runtime_opens_room_and_sends() {
    let env = MockEnv::new();
    let driver = FakeDriver { env: env.clone(), ..FakeDriver::default() };
    let mut runtime = Runtime::new(driver, env, SessionConfig::new(42));

    runtime.open_room(3).await.unwrap();
    assert_eq!(runtime.driver().dialed, vec![3]);
    assert_eq!(runtime.driver().history.len(), 1);
    assert!(runtime.driver().renders > 0);

    runtime.driver_mut().network.push_back(NetworkEvent::LinkUp { room_id: 3 });
    runtime.driver_mut().inputs.extend(FakeDriver::typing("hi there"));
    for _ in 0..10 {
        assert!(!runtime.process_cycle().await.unwrap());
    }

    let (room_id, frame) = &runtime.driver().transmitted[0];
    assert_eq!(*room_id, 3);
    assert_eq!(frame.content, "hi there");
    assert!(runtime.app().input_buffer().is_empty());

    // Oracle: the typing activity was flushed when the message was sent
    assert!(runtime.driver().telemetry.iter().any(|e| e.content == "hi there"));
}

#[tokio::test]
async fn refused_dial_schedules_reconnect() {
    let env = MockEnv::new();
    let driver = FakeDriver { env: env.clone(), refuse_dial: true, ..FakeDriver::default() };
    let mut runtime = Runtime::new(driver, env, SessionConfig::new(42));

    runtime.open_room(3).await.unwrap();

    assert_eq!(runtime.app().link_state(), LinkState::Reconnecting);
    assert!(runtime.bridge().client().retry_due_in().is_some());
}

#[tokio::test]
async fn quit_logs_out_and_stops() {
    let env = MockEnv::new();
    let released = Arc::new(Mutex::new(Vec::new()));
    let stopped = Arc::new(AtomicBool::new(false));
    let mut driver = FakeDriver {
        env: env.clone(),
        released: Arc::clone(&released),
        stopped: Arc::clone(&stopped),
        ..FakeDriver::default()
    };
    driver.inputs.extend(FakeDriver::typing("/room 3"));
    driver.inputs.extend(FakeDriver::typing("/quit"));
    let runtime = Runtime::new(driver, env, SessionConfig::new(42));

    runtime.run().await.unwrap();

    // Oracle: every link is released before the driver stops
    assert_eq!(*released.lock().unwrap(), vec![None]);
    assert!(stopped.load(Ordering::SeqCst));
}

#[test]
fn viewport_reflects_scroll() {
    let mut app = App::new();
    let _ = app.open_room(1);
    assert_eq!(app.viewport(), Viewport::AT_BOTTOM);
}
