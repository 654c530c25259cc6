//! Line-oriented terminal driver.
//!
//! Implements the [`Driver`] trait over stdin/stdout and the real transport:
//! one STOMP link per room, HTTP requests spawned onto the tokio runtime,
//! their outcomes funneled back through a channel as [`NetworkEvent`]s.
//! Reachability of the broker host stands in for online/offline signals.
//!
//! Each stdin line is replayed as key presses followed by Enter, so slash
//! commands and messages go through the same [`huddle_app::App`] editing path
//! as in any other front end.

use std::{
    collections::VecDeque,
    io::{self, Write},
    time::{Duration, Instant},
};

use huddle_app::{App, AppEvent, Driver, KeyInput, NetworkEvent};
use huddle_client::{
    BatchRequest, ConnectionRegistry, LinkHandle, LinkState, PageKind,
    transport::{
        ApiClient, DEFAULT_CHECK_INTERVAL, DEFAULT_CHECK_TIMEOUT, LinkConfig, LinkEvent,
        NetworkMonitor, Reachability, StompLink, TransportError,
    },
};
use huddle_proto::{HistoryQuery, OutboundFrame, RoomId, api::TrackedEvent};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
};
use tracing::{debug, warn};

use crate::Renderer;

/// Time between ticks while waiting for input.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Line driver errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No link is open for the room.
    #[error("no link for room {0}")]
    NoLink(RoomId),
}

/// Terminal driver reading commands line by line.
pub struct LineDriver {
    lines: Lines<BufReader<Stdin>>,
    pending: VecDeque<AppEvent>,
    input_closed: bool,
    links: ConnectionRegistry<StompLink>,
    link_config: LinkConfig,
    api: ApiClient,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    results_tx: mpsc::UnboundedSender<NetworkEvent>,
    results_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    reachability_rx: mpsc::UnboundedReceiver<Reachability>,
    _monitor: NetworkMonitor,
    renderer: Renderer,
}

impl LineDriver {
    /// Create a driver for the given endpoints. Must be called from within
    /// a tokio runtime.
    pub fn new(link_config: LinkConfig, api: ApiClient) -> Self {
        Self::with_network_check(link_config, api, DEFAULT_CHECK_INTERVAL)
    }

    /// Like [`Self::new`], checking the broker host every `interval`.
    pub fn with_network_check(
        link_config: LinkConfig,
        api: ApiClient,
        interval: Duration,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (reachability_tx, reachability_rx) = mpsc::unbounded_channel();
        let monitor = NetworkMonitor::spawn(
            link_config.authority(),
            interval,
            DEFAULT_CHECK_TIMEOUT.min(interval),
            reachability_tx,
        );

        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            pending: VecDeque::new(),
            input_closed: false,
            links: ConnectionRegistry::new(),
            link_config,
            api,
            link_tx,
            link_rx,
            results_tx,
            results_rx,
            reachability_rx,
            _monitor: monitor,
            renderer: Renderer::new(),
        }
    }

    fn queue_line(&mut self, line: &str) {
        self.pending.extend(KeyInput::line(line).map(AppEvent::Key));
    }

    /// Run `request` in the background and report its outcome.
    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = NetworkEvent> + Send + 'static,
    {
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            // The receiver only goes away on shutdown
            let _ = results.send(request.await);
        });
    }
}

impl Driver for LineDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent>, Self::Error> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        if self.input_closed {
            // End of input quits
            return Ok(Some(AppEvent::Key(KeyInput::Esc)));
        }

        tokio::select! {
            line = self.lines.next_line() => {
                match line? {
                    Some(line) => self.queue_line(line.trim_end()),
                    None => self.input_closed = true,
                }
                Ok(self.pending.pop_front())
            }
            () = tokio::time::sleep(TICK_INTERVAL) => Ok(Some(AppEvent::Tick)),
        }
    }

    async fn poll_network(&mut self) -> Option<NetworkEvent> {
        if let Ok(change) = self.reachability_rx.try_recv() {
            return Some(match change {
                Reachability::Reachable => NetworkEvent::Online,
                Reachability::Unreachable => NetworkEvent::Offline,
            });
        }
        if let Ok(event) = self.link_rx.try_recv() {
            return Some(match event {
                LinkEvent::Up { room_id } => NetworkEvent::LinkUp { room_id },
                LinkEvent::Down { room_id, reason } => NetworkEvent::LinkDown { room_id, reason },
                LinkEvent::Message { room_id, message } => {
                    NetworkEvent::LiveMessage { room_id, message }
                },
            });
        }
        self.results_rx.try_recv().ok()
    }

    async fn dial(&mut self, room_id: RoomId) -> Result<(), Self::Error> {
        let config = &self.link_config;
        let events = &self.link_tx;
        let link = self.links.acquire(room_id, || {
            Ok::<_, CliError>(StompLink::spawn(config.clone(), room_id, events.clone()))
        })?;

        // A reused link will not announce itself again
        if link.state() == LinkState::Connected {
            debug!(room_id, "reusing live link");
            let _ = self.results_tx.send(NetworkEvent::LinkUp { room_id });
        }
        Ok(())
    }

    async fn transmit(&mut self, room_id: RoomId, frame: OutboundFrame) -> Result<(), Self::Error> {
        let link = self.links.get(room_id).ok_or(CliError::NoLink(room_id))?;
        link.transmit(&frame)?;
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
        let api = self.api.clone();
        self.spawn_request(async move {
            let room_id = query.room_id;
            match api.history(&query).await {
                Ok(page) => NetworkEvent::HistoryLoaded {
                    room_id,
                    kind,
                    returned: page.returned,
                    messages: page.messages,
                },
                Err(err) => NetworkEvent::HistoryFailed { room_id, kind, reason: err.to_string() },
            }
        });
    }

    fn fetch_replies(&mut self, request: BatchRequest) {
        let api = self.api.clone();
        self.spawn_request(async move {
            match api.messages_by_id(request.room_id, &request.msg_ids).await {
                Ok(messages) => NetworkEvent::RepliesLoaded { request, messages },
                Err(err) => NetworkEvent::RepliesFailed { request, reason: err.to_string() },
            }
        });
    }

    fn fetch_roster(&mut self, room_id: RoomId) {
        let api = self.api.clone();
        self.spawn_request(async move {
            match tokio::try_join!(api.members(room_id), api.bots(room_id)) {
                Ok((members, bots)) => NetworkEvent::RosterLoaded { room_id, members, bots },
                Err(err) => NetworkEvent::RosterFailed { room_id, reason: err.to_string() },
            }
        });
    }

    fn submit_telemetry(&mut self, batch_id: u64, events: Vec<TrackedEvent>, attempt: u32) {
        let api = self.api.clone();
        self.spawn_request(async move {
            let result = api.track_batch(&events).await;
            if let Err(err) = &result {
                debug!(batch_id, attempt, %err, "telemetry batch rejected");
            }
            NetworkEvent::TelemetryResult { batch_id, ok: result.is_ok() }
        });
    }

    fn submit_telemetry_event(&mut self, event: TrackedEvent) {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.track_event(&event).await {
                warn!(%err, "telemetry event dropped");
            }
        });
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        let lines = self.renderer.render(app);
        if lines.is_empty() {
            return Ok(());
        }

        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn stop(&mut self) {
        let closed = self.links.invalidate_all();
        debug!(closed, "links closed");
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn next_network_event(driver: &mut LineDriver) -> NetworkEvent {
        for _ in 0..500 {
            if let Some(event) = driver.poll_network().await {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        unreachable!("no network event within 5s");
    }

    #[tokio::test]
    async fn broker_host_going_away_and_back_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = LinkConfig::new(format!("ws://{addr}/ws"));
        let api = ApiClient::new(format!("http://{addr}"));
        let mut driver = LineDriver::with_network_check(config, api, Duration::from_millis(20));

        drop(listener);
        assert!(matches!(next_network_event(&mut driver).await, NetworkEvent::Offline));

        let _listener = TcpListener::bind(addr).await.unwrap();
        assert!(matches!(next_network_event(&mut driver).await, NetworkEvent::Online));
    }
}
