//! STOMP 1.2 text framing.
//!
//! The real-time channel is a STOMP session carried over WebSocket text
//! messages, one frame per message. Each room is a topic; inbound `MESSAGE`
//! bodies are JSON [`crate::WireMessage`] objects and outbound `SEND` bodies
//! are JSON [`crate::OutboundFrame`] objects.
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! ...\n
//! \n
//! body\0
//! ```
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame
//! except `CONNECT` and `CONNECTED`. Bare EOLs between frames are heart-beats.

use std::{fmt, str::FromStr};

use crate::{ProtocolError, RoomId};

/// Protocol version negotiated in `CONNECT`.
pub const ACCEPT_VERSION: &str = "1.2";

/// Topic a room's live messages are published on.
pub fn room_topic(room_id: RoomId) -> String {
    format!("/topic/group/{room_id}")
}

/// Destination outbound messages for a room are sent to.
pub fn room_send_destination(room_id: RoomId) -> String {
    format!("/app/chat/{room_id}")
}

/// True if the input carries no frame, only heart-beat EOLs.
pub fn is_heartbeat(input: &str) -> bool {
    input.chars().all(|c| c == '\n' || c == '\r')
}

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    /// Client opens the session.
    Connect,
    /// Server accepted the session.
    Connected,
    /// Client publishes to a destination.
    Send,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client cancels a subscription.
    Unsubscribe,
    /// Client closes the session.
    Disconnect,
    /// Server delivers a message from a subscription.
    Message,
    /// Server acknowledges a frame carrying a `receipt` header.
    Receipt,
    /// Server reports an error; the session is closed afterwards.
    Error,
}

impl StompCommand {
    /// Command name as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order. Repeated names keep the first value.
    pub headers: Vec<(String, String)>,
    /// Frame body (UTF-8 text; JSON for chat payloads).
    pub body: String,
}

impl StompFrame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: StompCommand) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` frame for the given virtual host, with an optional bearer
    /// token.
    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let frame = Self::new(StompCommand::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        match token {
            Some(token) => frame.with_header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    /// `SUBSCRIBE` frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `UNSUBSCRIBE` frame.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame carrying a JSON body.
    pub fn send_json(destination: &str, json: impl Into<String>) -> Self {
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(json)
    }

    /// `DISCONNECT` frame requesting a receipt.
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(StompCommand::Disconnect).with_header("receipt", receipt)
    }

    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Encode to wire text, NUL-terminated.
    ///
    /// A `content-length` header is added for non-empty bodies when absent.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());

        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            push_header_part(&mut out, name, escape);
            out.push(':');
            push_header_part(&mut out, value, escape);
            out.push('\n');
        }

        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one frame from wire text.
    ///
    /// Leading heart-beat EOLs are skipped and trailing EOLs after the NUL
    /// terminator are accepted. Both `\n` and `\r\n` line endings are
    /// accepted.
    pub fn decode(input: &str) -> Result<Self, ProtocolError> {
        let mut cursor = input.trim_start_matches(['\r', '\n']);
        if cursor.is_empty() {
            return Err(ProtocolError::Stomp("empty frame".into()));
        }

        let command_line = next_line(&mut cursor)
            .ok_or_else(|| ProtocolError::Stomp("missing command line".into()))?;
        let command: StompCommand = command_line.parse()?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut cursor)
                .ok_or_else(|| ProtocolError::Stomp("unterminated header block".into()))?;
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::Stomp(format!("header without colon: {line}")))?;

            if escape {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::Stomp(format!("invalid content-length: {v}")))
            })
            .transpose()?;

        let (body, rest) = match content_length {
            Some(len) => {
                if len >= cursor.len() || !cursor.is_char_boundary(len) {
                    return Err(ProtocolError::Stomp("body shorter than content-length".into()));
                }
                let (body, tail) = cursor.split_at(len);
                let rest = tail
                    .strip_prefix('\0')
                    .ok_or_else(|| ProtocolError::Stomp("missing NUL terminator".into()))?;
                (body, rest)
            },
            None => {
                let end = cursor
                    .find('\0')
                    .ok_or_else(|| ProtocolError::Stomp("missing NUL terminator".into()))?;
                let (body, tail) = cursor.split_at(end);
                (body, tail.get(1..).unwrap_or_default())
            },
        };

        if !is_heartbeat(rest) {
            return Err(ProtocolError::Stomp("trailing data after frame".into()));
        }

        Ok(Self { command, headers, body: body.to_string() })
    }
}

fn next_line<'a>(cursor: &mut &'a str) -> Option<&'a str> {
    let end = cursor.find('\n')?;
    let (line, tail) = cursor.split_at(end);
    *cursor = tail.get(1..).unwrap_or_default();
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn push_header_part(out: &mut String, raw: &str, escape: bool) {
    if !escape {
        out.push_str(raw);
        return;
    }
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(ProtocolError::Stomp(format!("invalid header escape: \\{other}")));
            },
            None => return Err(ProtocolError::Stomp("dangling escape".into())),
        }
    }

    Ok(out)
}
