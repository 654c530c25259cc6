//! WebSocket/STOMP link for one room.
//!
//! [`StompLink::spawn`] starts a tokio task that connects, performs the STOMP
//! handshake, subscribes to the room topic and then pumps frames both ways.
//! The task never retries: a failed or lost link reports [`LinkEvent::Down`]
//! once and stops, and the session decides whether to dial again.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use huddle_core::LinkState;
use huddle_proto::{
    Message, OutboundFrame, RoomId, StompCommand, StompFrame,
    stomp::{is_heartbeat, room_send_destination, room_topic},
};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::TransportError;
use crate::LinkHandle;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8080/ws`.
    pub ws_url: String,
    /// STOMP virtual host.
    pub host: String,
    /// Bearer token sent with `CONNECT`.
    pub token: Option<String>,
}

impl LinkConfig {
    /// Config for an endpoint, using its host name as the virtual host.
    pub fn new(ws_url: impl Into<String>) -> Self {
        let ws_url = ws_url.into();
        let host = ws_url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split(['/', ':']).next())
            .unwrap_or("localhost")
            .to_string();
        Self { ws_url, host, token: None }
    }

    /// `host:port` of the endpoint, defaulting the port by scheme.
    pub fn authority(&self) -> String {
        let rest = self.ws_url.split("://").nth(1).unwrap_or(&self.ws_url);
        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.contains(':') {
            return authority.to_string();
        }
        let port = if self.ws_url.starts_with("wss://") { 443 } else { 80 };
        format!("{authority}:{port}")
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Notifications from a link task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake done and subscribed.
    Up {
        /// Room the link serves.
        room_id: RoomId,
    },
    /// Connect failed or an established link was lost. Not sent after
    /// [`LinkHandle::close`].
    Down {
        /// Room the link serves.
        room_id: RoomId,
        /// Failure description.
        reason: String,
    },
    /// Chat message pushed on the room topic.
    Message {
        /// Room the link serves.
        room_id: RoomId,
        /// Decoded message.
        message: Message,
    },
}

/// Handle to a running link task.
pub struct StompLink {
    room_id: RoomId,
    state: Arc<AtomicU8>,
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
}

impl StompLink {
    /// Start connecting. Must be called from within a tokio runtime.
    ///
    /// Returns immediately in the `Connecting` state.
    pub fn spawn(
        config: LinkConfig,
        room_id: RoomId,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let state = Arc::new(AtomicU8::new(LinkState::Connecting.to_u8()));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = Task {
            config,
            room_id,
            state: Arc::clone(&state),
            outgoing: outgoing_rx,
            shutdown: shutdown_rx,
            events,
        };
        tokio::spawn(task.run());

        Self { room_id, state, outgoing, shutdown }
    }

    /// Publish a chat message to the room.
    ///
    /// Frames queued before the handshake completes are sent once it does.
    pub fn transmit(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let json = frame.to_json()?;
        let text = StompFrame::send_json(&room_send_destination(self.room_id), json).encode();
        self.outgoing.send(text).map_err(|_| TransportError::Closed)
    }
}

impl LinkHandle for StompLink {
    fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn close(&self) {
        self.state.store(LinkState::Disconnected.to_u8(), Ordering::Release);
        // The task may already have exited
        let _ = self.shutdown.send(true);
    }
}

struct Task {
    config: LinkConfig,
    room_id: RoomId,
    state: Arc<AtomicU8>,
    outgoing: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Task {
    async fn run(mut self) {
        let room_id = self.room_id;
        let outcome = self.drive().await;
        self.state.store(LinkState::Disconnected.to_u8(), Ordering::Release);

        match outcome {
            Ok(()) => debug!(room_id, "link closed"),
            Err(err) if *self.shutdown.borrow() => debug!(room_id, %err, "link closed with error"),
            Err(err) => {
                warn!(room_id, %err, "link down");
                let _ = self.events.send(LinkEvent::Down { room_id, reason: err.to_string() });
            },
        }
    }

    /// Returns `Ok` only when shut down from this side.
    async fn drive(&mut self) -> Result<(), TransportError> {
        let connect = tokio::select! {
            result = tokio_tungstenite::connect_async(self.config.ws_url.as_str()) => result,
            _ = self.shutdown.changed() => return Ok(()),
        };
        let (mut ws, _) = connect.map_err(|e| TransportError::Connection(e.to_string()))?;

        let connect_frame = StompFrame::connect(&self.config.host, self.config.token.as_deref());
        send(&mut ws, &connect_frame).await?;

        loop {
            let frame = tokio::select! {
                frame = next_frame(&mut ws) => frame?,
                _ = self.shutdown.changed() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                },
            };
            match frame.command {
                StompCommand::Connected => break,
                StompCommand::Error => return Err(rejected(&frame)),
                other => debug!(command = other.as_str(), "ignoring frame before CONNECTED"),
            }
        }

        let subscription = format!("sub-{}", self.room_id);
        send(&mut ws, &StompFrame::subscribe(&subscription, &room_topic(self.room_id))).await?;

        self.state.store(LinkState::Connected.to_u8(), Ordering::Release);
        info!(room_id = self.room_id, "link up");
        let _ = self.events.send(LinkEvent::Up { room_id: self.room_id });

        loop {
            tokio::select! {
                frame = next_frame(&mut ws) => self.on_frame(frame?)?,
                text = self.outgoing.recv() => {
                    let Some(text) = text else {
                        let _ = ws.close(None).await;
                        return Ok(());
                    };
                    ws.send(WsMessage::Text(text))
                        .await
                        .map_err(|e| TransportError::Connection(e.to_string()))?;
                },
                _ = self.shutdown.changed() => {
                    let _ = send(&mut ws, &StompFrame::unsubscribe(&subscription)).await;
                    let _ = send(&mut ws, &StompFrame::disconnect("bye")).await;
                    let _ = ws.close(None).await;
                    return Ok(());
                },
            }
        }
    }

    fn on_frame(&self, frame: StompFrame) -> Result<(), TransportError> {
        match frame.command {
            StompCommand::Message => match Message::from_json(&frame.body) {
                Ok(message) => {
                    let _ = self.events.send(LinkEvent::Message { room_id: self.room_id, message });
                },
                Err(err) => warn!(room_id = self.room_id, %err, "dropping malformed message"),
            },
            StompCommand::Error => return Err(rejected(&frame)),
            other => debug!(command = other.as_str(), "ignoring frame"),
        }
        Ok(())
    }
}

async fn send(ws: &mut WsStream, frame: &StompFrame) -> Result<(), TransportError> {
    ws.send(WsMessage::Text(frame.encode()))
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))
}

/// Next well-formed STOMP frame. Heart-beats and garbage are skipped.
async fn next_frame(ws: &mut WsStream) -> Result<StompFrame, TransportError> {
    loop {
        let message = ws
            .next()
            .await
            .ok_or(TransportError::Closed)?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => return Err(TransportError::Closed),
            _ => continue,
        };
        if is_heartbeat(&text) {
            continue;
        }

        match StompFrame::decode(&text) {
            Ok(frame) => return Ok(frame),
            Err(err) => warn!(%err, "dropping malformed frame"),
        }
    }
}

fn rejected(frame: &StompFrame) -> TransportError {
    let reason = frame.header("message").unwrap_or(frame.body.as_str());
    TransportError::Connection(format!("broker error: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_comes_from_url() {
        assert_eq!(LinkConfig::new("ws://chat.example.com:8080/ws").host, "chat.example.com");
        assert_eq!(LinkConfig::new("wss://chat.example.com/ws").host, "chat.example.com");
        assert_eq!(LinkConfig::new("nonsense").host, "localhost");
    }

    #[test]
    fn authority_defaults_port() {
        let authority = |url: &str| LinkConfig::new(url).authority();
        assert_eq!(authority("ws://chat.example.com:8080/ws"), "chat.example.com:8080");
        assert_eq!(authority("ws://chat.example.com/ws"), "chat.example.com:80");
        assert_eq!(authority("wss://chat.example.com"), "chat.example.com:443");
    }

    #[tokio::test]
    async fn close_before_connect_is_silent() {
        let (events, mut rx) = mpsc::unbounded_channel();
        // Port 9 is the discard port; nothing answers WebSocket there
        let link = StompLink::spawn(LinkConfig::new("ws://127.0.0.1:9/ws"), 4, events);
        link.close();

        assert_eq!(link.state(), LinkState::Disconnected);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
