//! Protocol-to-Application translation layer.
//!
//! The [`Bridge`] wraps the session [`huddle_client::Client`] and adapts it to
//! the application lifecycle.
//!
//! # Responsibilities
//!
//! - Converts [`crate::AppAction`] into client events.
//! - Converts [`crate::NetworkEvent`] results of driver I/O into client events.
//! - Accumulates I/O [`Effect`]s for the driver to perform in the next cycle.
//! - Turns client actions into [`crate::AppEvent`]s that update the UI.

use huddle_client::{
    BatchRequest, Client, ClientAction, ClientError, ClientEvent, Environment, PageKind,
    SessionConfig, Viewport,
};
use huddle_proto::{HistoryQuery, OutboundFrame, RoomId, api::TrackedEvent};
use tracing::{debug, warn};

use crate::{AppAction, AppEvent, MessageView, NetworkEvent};

/// I/O the driver performs on behalf of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Acquire the room's link and report `LinkUp`/`LinkDown`.
    Dial {
        /// Room to connect.
        room_id: RoomId,
    },
    /// Close cached links.
    Release {
        /// Room whose link to close, or every room when `None`.
        room_id: Option<RoomId>,
    },
    /// Publish a message on the room's link.
    Transmit {
        /// Destination room.
        room_id: RoomId,
        /// Payload.
        frame: OutboundFrame,
    },
    /// Fetch a history page.
    FetchHistory {
        /// Page being fetched.
        kind: PageKind,
        /// Request parameters.
        query: HistoryQuery,
    },
    /// Fetch reply targets by id.
    FetchReplies(BatchRequest),
    /// Fetch members and bots.
    FetchRoster {
        /// Room to fetch.
        room_id: RoomId,
    },
    /// Submit a telemetry batch.
    SubmitTelemetry {
        /// Correlates the result.
        batch_id: u64,
        /// Events in the batch.
        events: Vec<TrackedEvent>,
        /// Submission number, starting at 1.
        attempt: u32,
    },
    /// Submit one telemetry event.
    SubmitTelemetryEvent(TrackedEvent),
}

/// Bridge between App and Client session logic.
///
/// Generic over Environment to support both production and simulation.
pub struct Bridge<E: Environment> {
    client: Client<E>,
    effects: Vec<Effect>,
}

impl<E: Environment> Bridge<E> {
    /// Create a new Bridge for the session.
    pub fn new(env: E, config: SessionConfig) -> Self {
        Self { client: Client::new(env, config), effects: Vec::new() }
    }

    /// Underlying session client.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent> {
        match action {
            AppAction::OpenRoom { room_id } => self.dispatch(ClientEvent::OpenRoom { room_id }),
            AppAction::CloseRoom => self.dispatch(ClientEvent::CloseRoom),
            AppAction::DraftChanged { text } => self.dispatch(ClientEvent::DraftChanged { text }),
            AppAction::Send { text } => {
                let mut events = self.dispatch(ClientEvent::DraftChanged { text });
                let result = self.client.handle(ClientEvent::Send);
                let sent = result.is_ok();
                events.extend(self.handle_client_result(result));
                if sent {
                    events.push(AppEvent::MessageSent);
                }
                events
            },
            AppAction::StartReply { msg_id } => self.dispatch(ClientEvent::StartReply { msg_id }),
            AppAction::CancelReply => self.dispatch(ClientEvent::CancelReply),
            AppAction::SelectBot { name } => self.select_bot(name),
            AppAction::LoadOlder => self.dispatch(ClientEvent::LoadOlder),
            AppAction::RetryNow => self.dispatch(ClientEvent::RetryNow),
            AppAction::Render | AppAction::Quit => vec![],
        }
    }

    /// Handle the result of driver I/O.
    ///
    /// `viewport` is the scroll position at the time the event arrived. It
    /// decides whether a live message scrolls into view.
    pub fn handle_network(&mut self, event: NetworkEvent, viewport: Viewport) -> Vec<AppEvent> {
        let event = match event {
            NetworkEvent::LinkUp { room_id } => ClientEvent::LinkUp { room_id },
            NetworkEvent::LinkDown { room_id, reason } => ClientEvent::LinkDown { room_id, reason },
            NetworkEvent::LiveMessage { room_id, message } => {
                ClientEvent::LiveMessage { room_id, message, viewport }
            },
            NetworkEvent::HistoryLoaded { room_id, kind, returned, messages } => {
                ClientEvent::HistoryLoaded { room_id, kind, returned, messages }
            },
            NetworkEvent::HistoryFailed { room_id, kind, reason } => {
                ClientEvent::HistoryFailed { room_id, kind, reason }
            },
            NetworkEvent::RepliesLoaded { request, messages } => ClientEvent::RepliesLoaded {
                room_id: request.room_id,
                request_id: request.request_id,
                messages,
            },
            NetworkEvent::RepliesFailed { request, reason } => ClientEvent::RepliesFailed {
                room_id: request.room_id,
                request_id: request.request_id,
                reason,
            },
            NetworkEvent::RosterLoaded { room_id, members, bots } => {
                ClientEvent::RosterLoaded { room_id, members, bots }
            },
            NetworkEvent::RosterFailed { room_id, reason } => {
                warn!(room_id, %reason, "roster unavailable, showing placeholder names");
                return vec![];
            },
            NetworkEvent::TelemetryResult { batch_id, ok } => {
                ClientEvent::TelemetryResult { batch_id, ok }
            },
            NetworkEvent::Online => ClientEvent::NetworkOnline,
            NetworkEvent::Offline => ClientEvent::NetworkOffline,
        };
        self.dispatch(event)
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent> {
        self.dispatch(ClientEvent::Tick { now })
    }

    /// End the session, flushing telemetry and releasing every link.
    pub fn logout(&mut self) -> Vec<AppEvent> {
        self.dispatch(ClientEvent::Logout)
    }

    /// Take pending I/O effects.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn select_bot(&mut self, name: Option<String>) -> Vec<AppEvent> {
        let Some(name) = name else {
            let mut events = self.dispatch(ClientEvent::SelectBot { bot_id: None });
            events.push(AppEvent::BotSelected { name: None });
            return events;
        };

        let bot_id = self
            .client
            .active_room()
            .and_then(|room_id| self.client.roster().bot_by_name(room_id, &name));
        let Some(bot_id) = bot_id else {
            return vec![AppEvent::Error { message: format!("no bot named {name} in this room") }];
        };

        let mut events = self.dispatch(ClientEvent::SelectBot { bot_id: Some(bot_id) });
        events.push(AppEvent::BotSelected { name: Some(name) });
        events
    }

    fn dispatch(&mut self, event: ClientEvent<E::Instant>) -> Vec<AppEvent> {
        let result = self.client.handle(event);
        self.handle_client_result(result)
    }

    fn handle_client_result(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(e) => vec![AppEvent::Error { message: e.to_string() }],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                ClientAction::Dial { room_id } => self.effects.push(Effect::Dial { room_id }),
                ClientAction::ReleaseLinks { room_id } => {
                    self.effects.push(Effect::Release { room_id });
                },
                ClientAction::Transmit { room_id, frame } => {
                    self.effects.push(Effect::Transmit { room_id, frame });
                },
                ClientAction::FetchHistory { kind, query } => {
                    self.effects.push(Effect::FetchHistory { kind, query });
                },
                ClientAction::FetchReplies(request) => {
                    self.effects.push(Effect::FetchReplies(request));
                },
                ClientAction::FetchRoster { room_id } => {
                    self.effects.push(Effect::FetchRoster { room_id });
                },
                ClientAction::SubmitTelemetry { batch_id, events, attempt } => {
                    self.effects.push(Effect::SubmitTelemetry { batch_id, events, attempt });
                },
                ClientAction::SubmitTelemetryEvent(event) => {
                    self.effects.push(Effect::SubmitTelemetryEvent(event));
                },
                ClientAction::LinkStateChanged { room_id, state } => {
                    events.push(AppEvent::LinkChanged { room_id, state });
                },
                ClientAction::StoreChanged { room_id } => {
                    events.push(self.messages_updated(room_id));
                },
                ClientAction::ScrollToBottom { room_id } => {
                    events.push(AppEvent::ScrollToBottom { room_id });
                },
                ClientAction::NewMessageIndicator { room_id } => {
                    events.push(AppEvent::NewMessages { room_id });
                },
                ClientAction::Log { message } => debug!(%message, "client"),
            }
        }

        events
    }

    fn messages_updated(&self, room_id: RoomId) -> AppEvent {
        let store = self.client.store();
        let roster = self.client.roster();
        let messages =
            store.messages().map(|entry| MessageView::from_stored(room_id, entry, roster)).collect();
        AppEvent::MessagesUpdated { room_id, messages, has_more: store.has_more() }
    }
}
