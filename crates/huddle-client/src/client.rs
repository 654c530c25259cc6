//! Chat session reducer.
//!
//! [`Client`] folds every inbound event into the active room's state and
//! returns actions for the caller. It owns one instance of each component
//! (store, resolver, composer, reconnection controller, telemetry batcher,
//! roster) and is the only code that mutates them.
//!
//! Responses carry the room they were requested for. A response whose room is
//! not the active room when it is applied is discarded, which is how a room
//! switch cancels everything still in flight for the previous room.

use huddle_core::{
    LinkState, ReconnectAction, ReconnectConfig, ReconnectController, env::Environment,
};
use huddle_proto::{
    Message, MessageId, RoomId, UserId,
    api::{BotProfile, DEFAULT_PAGE_SIZE, MemberProfile, TrackedEvent},
};
use tracing::{debug, info, warn};

use crate::{
    ClientAction, ClientError, ClientEvent, ComposeError, Composer, FlushReason, Ingest,
    MessageStore, PageKind, ReplyResolver, Roster, ScrollHint, TelemetryAction,
    TelemetryBatcher, TelemetryConfig, Viewport,
};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Signed-in user
    pub user_id: UserId,
    /// Messages per history page
    pub page_size: usize,
    /// Link retry schedule
    pub reconnect: ReconnectConfig,
    /// Typing telemetry batching
    pub telemetry: TelemetryConfig,
}

impl SessionConfig {
    /// Defaults for the given user.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, ..Self::default() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: 0,
            page_size: DEFAULT_PAGE_SIZE,
            reconnect: ReconnectConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Chat session state machine for one signed-in user.
pub struct Client<E: Environment> {
    /// Environment for time and jitter
    env: E,

    user_id: UserId,

    /// Room whose state is loaded
    active_room: Option<RoomId>,

    store: MessageStore,
    resolver: ReplyResolver,
    composer: Composer,
    reconnect: ReconnectController<E::Instant>,
    telemetry: TelemetryBatcher<E::Instant>,

    /// Survives room switches, cleared on logout
    roster: Roster,
}

impl<E: Environment> Client<E> {
    /// Create a client with no room open.
    pub fn new(env: E, config: SessionConfig) -> Self {
        Self {
            env,
            user_id: config.user_id,
            active_room: None,
            store: MessageStore::new(config.page_size),
            resolver: ReplyResolver::new(),
            composer: Composer::new(),
            reconnect: ReconnectController::new(config.reconnect),
            telemetry: TelemetryBatcher::new(config.telemetry),
            roster: Roster::new(),
        }
    }

    /// Signed-in user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Room whose state is loaded.
    pub fn active_room(&self) -> Option<RoomId> {
        self.active_room
    }

    /// Messages of the active room.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Compose box state.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Member and bot profiles.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// In-flight reply lookups.
    pub fn resolver(&self) -> &ReplyResolver {
        &self.resolver
    }

    /// Telemetry queue.
    pub fn telemetry(&self) -> &TelemetryBatcher<E::Instant> {
        &self.telemetry
    }

    /// Active room's link state.
    pub fn link_state(&self) -> LinkState {
        self.reconnect.state()
    }

    /// Time left until a scheduled reconnect.
    pub fn retry_due_in(&self) -> Option<std::time::Duration> {
        self.reconnect.retry_due_in(self.env.now())
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::OpenRoom { room_id } => Ok(self.handle_open_room(room_id)),
            ClientEvent::CloseRoom => Ok(self.handle_close_room()),
            ClientEvent::Logout => Ok(self.handle_logout()),
            ClientEvent::LinkUp { room_id } => self.handle_link_up(room_id),
            ClientEvent::LinkDown { room_id, reason } => Ok(self.handle_link_down(room_id, &reason)),
            ClientEvent::NetworkOnline => Ok(self.handle_network(true)),
            ClientEvent::NetworkOffline => Ok(self.handle_network(false)),
            ClientEvent::RetryNow => {
                let actions = self.reconnect.retry_now();
                Ok(self.convert_reconnect_actions(actions))
            },
            ClientEvent::HistoryLoaded { room_id, kind, returned, messages } => {
                Ok(self.handle_history_loaded(room_id, kind, returned, messages))
            },
            ClientEvent::HistoryFailed { room_id, kind, reason } => {
                Ok(self.handle_history_failed(room_id, kind, &reason))
            },
            ClientEvent::LiveMessage { room_id, message, viewport } => {
                Ok(self.handle_live_message(room_id, message, viewport))
            },
            ClientEvent::LoadOlder => self.handle_load_older(),
            ClientEvent::RepliesLoaded { room_id, request_id, messages } => {
                Ok(self.handle_replies_loaded(room_id, request_id, messages))
            },
            ClientEvent::RepliesFailed { room_id, request_id, reason } => {
                Ok(self.handle_replies_failed(room_id, request_id, &reason))
            },
            ClientEvent::RosterLoaded { room_id, members, bots } => {
                Ok(self.handle_roster_loaded(room_id, members, bots))
            },
            ClientEvent::DraftChanged { text } => Ok(self.handle_draft_changed(text)),
            ClientEvent::StartReply { msg_id } => {
                self.composer.start_reply(msg_id);
                Ok(Vec::new())
            },
            ClientEvent::CancelReply => {
                self.composer.cancel_reply();
                Ok(Vec::new())
            },
            ClientEvent::SelectBot { bot_id } => {
                self.composer.select_bot(bot_id);
                Ok(Vec::new())
            },
            ClientEvent::Send => self.handle_send(),
            ClientEvent::TelemetryResult { batch_id, ok } => {
                let actions = self.telemetry.on_result(batch_id, ok, self.env.now());
                Ok(convert_telemetry_actions(actions))
            },
            ClientEvent::Unload => {
                let actions = self.telemetry.flush(FlushReason::Unload, self.env.now());
                Ok(convert_telemetry_actions(actions))
            },
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    fn handle_open_room(&mut self, room_id: RoomId) -> Vec<ClientAction> {
        if self.active_room == Some(room_id) {
            let connect = self.reconnect.connect();
            let mut actions = self.convert_reconnect_actions(connect);
            if !actions.iter().any(|a| matches!(a, ClientAction::LinkStateChanged { .. })) {
                // Already live or parked: restate it for views that reset
                actions.push(ClientAction::LinkStateChanged {
                    room_id,
                    state: self.reconnect.state(),
                });
            }
            actions.push(ClientAction::StoreChanged { room_id });
            return actions;
        }

        let mut actions = Vec::new();
        if let Some(previous) = self.active_room {
            info!(from = previous, to = room_id, "switching room");
            let shutdown = self.reconnect.shutdown();
            actions.extend(self.convert_reconnect_actions(shutdown));
        } else {
            info!(room_id, "opening room");
        }

        self.reset_room_state();
        self.store.switch_room(room_id);
        self.active_room = Some(room_id);

        let connect = self.reconnect.connect();
        if connect.is_empty() {
            // Offline: report the parked state so the indicator is right
            actions.push(ClientAction::LinkStateChanged { room_id, state: self.reconnect.state() });
        }
        actions.extend(self.convert_reconnect_actions(connect));

        if let Some(query) = self.store.begin_load(PageKind::Initial) {
            actions.push(ClientAction::FetchHistory { kind: PageKind::Initial, query });
        }
        if !self.roster.has_room(room_id) {
            actions.push(ClientAction::FetchRoster { room_id });
        }
        actions.push(ClientAction::StoreChanged { room_id });

        actions
    }

    fn handle_close_room(&mut self) -> Vec<ClientAction> {
        let Some(room_id) = self.active_room else {
            return Vec::new();
        };
        info!(room_id, "closing room");

        let shutdown = self.reconnect.shutdown();
        let mut actions = self.convert_reconnect_actions(shutdown);

        self.reset_room_state();
        self.store.clear();
        self.active_room = None;

        actions.push(ClientAction::ReleaseLinks { room_id: Some(room_id) });
        actions.push(ClientAction::StoreChanged { room_id });
        actions
    }

    fn handle_logout(&mut self) -> Vec<ClientAction> {
        let flushed = self.telemetry.flush(FlushReason::Unload, self.env.now());

        let mut actions = self.handle_close_room();
        actions.retain(|a| !matches!(a, ClientAction::ReleaseLinks { .. }));
        actions.push(ClientAction::ReleaseLinks { room_id: None });
        actions.extend(convert_telemetry_actions(flushed));

        self.roster.clear();
        actions
    }

    fn handle_link_up(&mut self, room_id: RoomId) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_active(room_id) {
            return Ok(vec![stale("link up", room_id)]);
        }

        let reconnect_actions = self.reconnect.on_connected()?;
        Ok(self.convert_reconnect_actions(reconnect_actions))
    }

    fn handle_link_down(&mut self, room_id: RoomId, reason: &str) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("link down", room_id)];
        }

        warn!(room_id, reason, "link down");
        let jitter = self.env.jitter(self.reconnect.config().max_jitter);
        let reconnect_actions = self.reconnect.on_failure(self.env.now(), jitter);
        self.convert_reconnect_actions(reconnect_actions)
    }

    fn handle_network(&mut self, online: bool) -> Vec<ClientAction> {
        debug!(online, "network availability changed");
        let reconnect_actions = self.reconnect.set_online(online);
        self.convert_reconnect_actions(reconnect_actions)
    }

    fn handle_history_loaded(
        &mut self,
        room_id: RoomId,
        kind: PageKind,
        returned: usize,
        messages: Vec<Message>,
    ) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("history page", room_id)];
        }

        let ingest = self.store.ingest_history(kind, returned, messages);
        let mut actions = self.after_ingest(room_id, &ingest);

        if kind == PageKind::Initial {
            actions.push(ClientAction::StoreChanged { room_id });
            actions.push(ClientAction::ScrollToBottom { room_id });
        } else if ingest.changed() {
            actions.push(ClientAction::StoreChanged { room_id });
        }

        actions.extend(self.queued_catch_up());
        dedup_store_changed(&mut actions);
        actions
    }

    fn handle_history_failed(
        &mut self,
        room_id: RoomId,
        kind: PageKind,
        reason: &str,
    ) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("history failure", room_id)];
        }

        warn!(room_id, ?kind, reason, "history request failed");
        self.store.load_failed();

        let mut actions =
            vec![ClientAction::Log { message: format!("Loading {kind:?} history failed: {reason}") }];
        actions.extend(self.queued_catch_up());
        actions
    }

    fn handle_live_message(
        &mut self,
        room_id: RoomId,
        message: Message,
        viewport: Viewport,
    ) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("live message", room_id)];
        }

        let (ingest, hint) = self.store.ingest_live(message, viewport);
        let mut actions = self.after_ingest(room_id, &ingest);

        if ingest.changed() {
            actions.push(ClientAction::StoreChanged { room_id });
        }
        match hint {
            ScrollHint::ScrollToBottom => actions.push(ClientAction::ScrollToBottom { room_id }),
            ScrollHint::NewMessageIndicator => {
                actions.push(ClientAction::NewMessageIndicator { room_id });
            },
            ScrollHint::None => {},
        }

        actions
    }

    fn handle_load_older(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.active_room.is_none() {
            return Err(ClientError::NoActiveRoom { operation: "load older messages" });
        }

        Ok(self
            .store
            .begin_load(PageKind::Older)
            .map(|query| ClientAction::FetchHistory { kind: PageKind::Older, query })
            .into_iter()
            .collect())
    }

    fn handle_replies_loaded(
        &mut self,
        room_id: RoomId,
        request_id: u64,
        messages: Vec<Message>,
    ) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("reply lookup", room_id)];
        }

        let found: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        let Some(outcome) = self.resolver.complete(request_id, &found) else {
            return vec![ClientAction::Log {
                message: format!("Ignoring answer to unknown reply lookup {request_id}"),
            }];
        };

        let resolution = self.store.apply_resolution(&outcome.requested, messages);
        debug!(
            request_id,
            resolved = resolution.resolved,
            unavailable = resolution.unavailable,
            "reply lookup applied"
        );

        if resolution.resolved + resolution.unavailable > 0 {
            vec![ClientAction::StoreChanged { room_id }]
        } else {
            Vec::new()
        }
    }

    fn handle_replies_failed(
        &mut self,
        room_id: RoomId,
        request_id: u64,
        reason: &str,
    ) -> Vec<ClientAction> {
        if !self.is_active(room_id) {
            return vec![stale("reply lookup failure", room_id)];
        }

        let Some(outcome) = self.resolver.fail(request_id) else {
            return Vec::new();
        };
        warn!(request_id, reason, count = outcome.requested.len(), "reply lookup failed");

        let marked = self.store.resolution_failed(&outcome.requested);
        let mut actions = vec![ClientAction::Log {
            message: format!("Reply lookup {request_id} failed: {reason}"),
        }];
        if marked > 0 {
            actions.push(ClientAction::StoreChanged { room_id });
        }
        actions
    }

    fn handle_roster_loaded(
        &mut self,
        room_id: RoomId,
        members: Vec<MemberProfile>,
        bots: Vec<BotProfile>,
    ) -> Vec<ClientAction> {
        debug!(room_id, members = members.len(), bots = bots.len(), "roster loaded");
        self.roster.load(room_id, members, bots);

        if self.is_active(room_id) { vec![ClientAction::StoreChanged { room_id }] } else { Vec::new() }
    }

    fn handle_draft_changed(&mut self, text: String) -> Vec<ClientAction> {
        self.composer.set_draft(text);

        let Some(room_id) = self.active_room else {
            return Vec::new();
        };
        let content = self.composer.draft();
        if content.trim().is_empty() {
            return Vec::new();
        }

        let event = TrackedEvent::typing(
            room_id,
            self.user_id,
            content.to_string(),
            self.env.wall_clock_millis(),
        );
        let actions = self.telemetry.record(event, self.env.now());
        convert_telemetry_actions(actions)
    }

    fn handle_send(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let room_id = self.active_room.ok_or(ComposeError::NoRoom)?;

        let state = self.reconnect.state();
        if state != LinkState::Connected {
            return Err(ComposeError::NotConnected { state }.into());
        }

        let bots = self.roster.bots(room_id);
        let frame =
            self.composer.take_frame(room_id, self.user_id, &bots, self.env.wall_clock_millis())?;
        debug!(room_id, bot = ?frame.bot_id, reply_to = ?frame.reply_to_msg_id, "sending message");

        let mut actions = vec![ClientAction::Transmit { room_id, frame }];
        let flushed = self.telemetry.flush(FlushReason::MessageSent, self.env.now());
        actions.extend(convert_telemetry_actions(flushed));
        Ok(actions)
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let reconnect_actions = self.reconnect.tick(now);
        let mut actions = self.convert_reconnect_actions(reconnect_actions);
        actions.extend(convert_telemetry_actions(self.telemetry.tick(now)));
        actions
    }

    /// Reply lookups for targets the merge could not find.
    fn after_ingest(&mut self, room_id: RoomId, ingest: &Ingest) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if ingest.rejected > 0 {
            actions.push(ClientAction::Log {
                message: format!("Dropped {} message(s) for another room", ingest.rejected),
            });
        }
        if let Some(request) = self.resolver.schedule(room_id, ingest.missing_replies.iter().copied())
        {
            actions.push(ClientAction::FetchReplies(request));
        }
        actions
    }

    fn queued_catch_up(&mut self) -> Option<ClientAction> {
        if !self.store.take_queued_catch_up() {
            return None;
        }
        self.store
            .begin_load(PageKind::CatchUp)
            .map(|query| ClientAction::FetchHistory { kind: PageKind::CatchUp, query })
    }

    fn reset_room_state(&mut self) {
        self.resolver.clear();
        self.composer.clear();
    }

    fn is_active(&self, room_id: RoomId) -> bool {
        self.active_room == Some(room_id)
    }

    /// Convert reconnection actions to client actions for the active room.
    fn convert_reconnect_actions(&mut self, actions: Vec<ReconnectAction>) -> Vec<ClientAction> {
        let Some(room_id) = self.active_room else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for action in actions {
            match action {
                ReconnectAction::Dial => out.push(ClientAction::Dial { room_id }),
                ReconnectAction::ScheduleRetry { attempt, delay } => out.push(ClientAction::Log {
                    message: format!("Reconnect attempt {attempt} in {delay:?}"),
                }),
                ReconnectAction::CatchUp => {
                    if let Some(query) = self.store.begin_load(PageKind::CatchUp) {
                        out.push(ClientAction::FetchHistory { kind: PageKind::CatchUp, query });
                    }
                },
                ReconnectAction::GiveUp { error } => out.push(ClientAction::Log {
                    message: format!("Stopped reconnecting: {error}"),
                }),
                ReconnectAction::StateChanged(state) => {
                    out.push(ClientAction::LinkStateChanged { room_id, state });
                },
            }
        }
        out
    }
}

fn convert_telemetry_actions(actions: Vec<TelemetryAction>) -> Vec<ClientAction> {
    actions
        .into_iter()
        .map(|action| match action {
            TelemetryAction::SubmitBatch { batch_id, events, attempt } => {
                ClientAction::SubmitTelemetry { batch_id, events, attempt }
            },
            TelemetryAction::SubmitEvent(event) => ClientAction::SubmitTelemetryEvent(event),
        })
        .collect()
}

fn stale(what: &str, room_id: RoomId) -> ClientAction {
    debug!(room_id, what, "discarding stale response");
    ClientAction::Log { message: format!("Discarded {what} for inactive room {room_id}") }
}

fn dedup_store_changed(actions: &mut Vec<ClientAction>) {
    let mut seen = false;
    actions.retain(|action| {
        if matches!(action, ClientAction::StoreChanged { .. }) {
            if seen {
                return false;
            }
            seen = true;
        }
        true
    });
}
