//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`huddle_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Requests are answered from a [`SimBackend`]. Answers normally arrive in
//! request order on the next poll. Tests can hold them back and release them
//! in any order to exercise late and interleaved responses.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};

use huddle_app::{App, AppEvent, Driver, KeyInput, NetworkEvent};
use huddle_client::{BatchRequest, ConnectionRegistry, Environment, LinkHandle, LinkState, PageKind};
use huddle_proto::{HistoryQuery, MessageId, OutboundFrame, RoomId, SenderRef, api::TrackedEvent};
use tracing::debug;

use crate::{SimBackend, SimEnv};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Simulated room link.
pub struct SimLink {
    room_id: RoomId,
    state: AtomicU8,
}

impl SimLink {
    fn connecting(room_id: RoomId) -> Self {
        Self { room_id, state: AtomicU8::new(LinkState::Connecting.to_u8()) }
    }

    fn set(&self, state: LinkState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }
}

impl LinkHandle for SimLink {
    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn close(&self) {
        self.set(LinkState::Disconnected);
    }
}

/// Number of upcoming requests of each kind that fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Dials answered with `LinkDown`.
    pub dials: u32,
    /// History requests answered with `HistoryFailed`.
    pub history: u32,
    /// Reply lookups answered with `RepliesFailed`.
    pub replies: u32,
    /// Roster requests answered with `RosterFailed`.
    pub roster: u32,
    /// Telemetry batches reported as rejected.
    pub telemetry: u32,
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    true
}

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
#[derive(Default)]
struct SharedState {
    backend: SimBackend,
    faults: Faults,
    pending_events: VecDeque<AppEvent>,
    inbox: VecDeque<NetworkEvent>,
    held: Vec<NetworkEvent>,
    holding: bool,
    dials: Vec<RoomId>,
    history_requests: Vec<(PageKind, HistoryQuery)>,
    transmitted: Vec<(RoomId, OutboundFrame)>,
    telemetry_batches: Vec<(u64, u32)>,
    telemetry_events: Vec<TrackedEvent>,
    renders: usize,
    stopped: bool,
}

impl SharedState {
    fn respond(&mut self, event: NetworkEvent) {
        if self.holding {
            self.held.push(event);
        } else {
            self.inbox.push_back(event);
        }
    }
}

/// Simulation driver for deterministic testing.
///
/// Clones share all state, so a test keeps a clone to inject input and
/// inspect requests while the [`huddle_app::Runtime`] owns the original.
#[derive(Clone)]
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
    links: Arc<ConnectionRegistry<SimLink>>,
}

impl SimDriver {
    /// Create a driver answering from `backend`.
    pub fn new(env: SimEnv, backend: SimBackend) -> Self {
        let state = SharedState { backend, ..SharedState::default() };
        Self { env, state: Arc::new(Mutex::new(state)), links: Arc::new(ConnectionRegistry::new()) }
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.lock().pending_events.push_back(event);
    }

    /// Inject the key presses of `text` without submitting it.
    pub fn type_keys(&self, text: &str) {
        self.lock().pending_events.extend(KeyInput::typed(text).map(AppEvent::Key));
    }

    /// Inject the key presses of a line followed by Enter.
    pub fn type_line(&self, line: &str) {
        self.type_keys(line);
        self.inject_event(AppEvent::Key(KeyInput::Enter));
    }

    /// Inject a network result directly.
    pub fn inject_network(&self, event: NetworkEvent) {
        self.lock().inbox.push_back(event);
    }

    /// Another participant posts to the room. Delivered live if the room's
    /// link is connected.
    pub fn post(
        &self,
        room_id: RoomId,
        sender: SenderRef,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> MessageId {
        let connected = self.link_state(room_id) == Some(LinkState::Connected);
        let mut state = self.lock();
        let message = state.backend.post(room_id, sender, content.to_string(), reply_to);
        let id = message.id;
        if connected {
            state.respond(NetworkEvent::LiveMessage { room_id, message });
        }
        id
    }

    /// Drop the room's link as if the socket closed.
    pub fn drop_link(&self, room_id: RoomId, reason: &str) {
        if let Some(link) = self.links.get(room_id) {
            link.set(LinkState::Disconnected);
        }
        self.lock().respond(NetworkEvent::LinkDown { room_id, reason: reason.to_string() });
    }

    /// Report a change in network availability.
    pub fn set_online(&self, online: bool) {
        let event = if online { NetworkEvent::Online } else { NetworkEvent::Offline };
        self.lock().inbox.push_back(event);
    }

    /// Hold responses back until released.
    pub fn hold(&self) {
        self.lock().holding = true;
    }

    /// Responses currently held back.
    pub fn held(&self) -> Vec<NetworkEvent> {
        self.lock().held.clone()
    }

    /// Deliver held responses matching `pred`, in the order they were made.
    pub fn release_where(&self, pred: impl Fn(&NetworkEvent) -> bool) {
        let mut state = self.lock();
        let held = std::mem::take(&mut state.held);
        let (release, keep): (Vec<_>, Vec<_>) = held.into_iter().partition(|e| pred(e));
        state.held = keep;
        state.inbox.extend(release);
    }

    /// Deliver held responses newest first and stop holding.
    pub fn release_reversed(&self) {
        let mut state = self.lock();
        let held = std::mem::take(&mut state.held);
        state.inbox.extend(held.into_iter().rev());
        state.holding = false;
    }

    /// Deliver held responses in order and stop holding.
    pub fn release_all(&self) {
        let mut state = self.lock();
        let held = std::mem::take(&mut state.held);
        state.inbox.extend(held);
        state.holding = false;
    }

    /// Make upcoming requests fail.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Run `f` against the backend.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut SimBackend) -> R) -> R {
        f(&mut self.lock().backend)
    }

    /// Rooms dialed so far, in order.
    pub fn dials(&self) -> Vec<RoomId> {
        self.lock().dials.clone()
    }

    /// History requests made so far.
    pub fn history_requests(&self) -> Vec<(PageKind, HistoryQuery)> {
        self.lock().history_requests.clone()
    }

    /// Frames published so far.
    pub fn transmitted(&self) -> Vec<(RoomId, OutboundFrame)> {
        self.lock().transmitted.clone()
    }

    /// Telemetry batches submitted as `(batch_id, attempt)`.
    pub fn telemetry_batches(&self) -> Vec<(u64, u32)> {
        self.lock().telemetry_batches.clone()
    }

    /// Telemetry events submitted one by one.
    pub fn telemetry_events(&self) -> Vec<TrackedEvent> {
        self.lock().telemetry_events.clone()
    }

    /// Number of renders.
    pub fn renders(&self) -> usize {
        self.lock().renders
    }

    /// True once the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Cached link state of the room.
    pub fn link_state(&self, room_id: RoomId) -> Option<LinkState> {
        self.links.get(room_id).map(|link| link.state())
    }

    /// Rooms with a cached link.
    pub fn linked_rooms(&self) -> Vec<RoomId> {
        self.links.rooms()
    }

    /// Check if there is pending input or network results.
    pub fn has_pending(&self) -> bool {
        let state = self.lock();
        !state.pending_events.is_empty() || !state.inbox.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = std::time::Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        Ok(self.lock().pending_events.pop_front())
    }

    async fn poll_network(&mut self) -> Option<NetworkEvent> {
        self.lock().inbox.pop_front()
    }

    async fn dial(&mut self, room_id: RoomId) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.dials.push(room_id);

        if take_fault(&mut state.faults.dials) {
            debug!(room_id, "dial refused");
            state.respond(NetworkEvent::LinkDown { room_id, reason: "connection refused".into() });
            return Ok(());
        }

        let Ok(link) =
            self.links.acquire(room_id, || Ok::<_, SimDriverError>(SimLink::connecting(room_id)))
        else {
            return Err(SimDriverError(format!("cannot create link for room {room_id}")));
        };
        link.set(LinkState::Connected);
        state.respond(NetworkEvent::LinkUp { room_id });
        Ok(())
    }

    async fn transmit(&mut self, room_id: RoomId, frame: OutboundFrame) -> Result<(), Self::Error> {
        if self.link_state(room_id) != Some(LinkState::Connected) {
            return Err(SimDriverError(format!("no live link for room {room_id}")));
        }

        let mut state = self.lock();
        state.transmitted.push((room_id, frame.clone()));
        for message in state.backend.accept(&frame) {
            state.respond(NetworkEvent::LiveMessage { room_id, message });
        }
        Ok(())
    }

    fn release(&mut self, room_id: Option<RoomId>) {
        match room_id {
            Some(room_id) => {
                self.links.invalidate(room_id);
            },
            None => {
                self.links.invalidate_all();
            },
        }
    }

    fn fetch_history(&mut self, kind: PageKind, query: HistoryQuery) {
        let mut state = self.lock();
        let room_id = query.room_id;
        state.history_requests.push((kind, query));
        let event = if take_fault(&mut state.faults.history) {
            NetworkEvent::HistoryFailed { room_id, kind, reason: "503 Service Unavailable".into() }
        } else {
            let page = state.backend.history_page(&query);
            NetworkEvent::HistoryLoaded {
                room_id,
                kind,
                returned: page.returned,
                messages: page.messages,
            }
        };
        state.respond(event);
    }

    fn fetch_replies(&mut self, request: BatchRequest) {
        let mut state = self.lock();
        let event = if take_fault(&mut state.faults.replies) {
            NetworkEvent::RepliesFailed { request, reason: "503 Service Unavailable".into() }
        } else {
            let messages = state.backend.messages_by_id(request.room_id, &request.msg_ids);
            NetworkEvent::RepliesLoaded { request, messages }
        };
        state.respond(event);
    }

    fn fetch_roster(&mut self, room_id: RoomId) {
        let mut state = self.lock();
        let event = if take_fault(&mut state.faults.roster) {
            NetworkEvent::RosterFailed { room_id, reason: "503 Service Unavailable".into() }
        } else {
            let (members, bots) = state.backend.roster(room_id);
            NetworkEvent::RosterLoaded { room_id, members, bots }
        };
        state.respond(event);
    }

    fn submit_telemetry(&mut self, batch_id: u64, _events: Vec<TrackedEvent>, attempt: u32) {
        let mut state = self.lock();
        state.telemetry_batches.push((batch_id, attempt));
        let ok = !take_fault(&mut state.faults.telemetry);
        state.respond(NetworkEvent::TelemetryResult { batch_id, ok });
    }

    fn submit_telemetry_event(&mut self, event: TrackedEvent) {
        self.lock().telemetry_events.push(event);
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render(&mut self, _app: &App) -> Result<(), Self::Error> {
        self.lock().renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.links.invalidate_all();
        self.lock().stopped = true;
    }
}
