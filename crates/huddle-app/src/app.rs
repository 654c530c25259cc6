//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the interactive
//! state of the chat front end completely decoupled from I/O and protocol
//! mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Edits the compose line and interprets slash commands.
//! - Holds the active room's message view, scroll position and the "new
//!   messages" flag.
//! - Tracks the link state for the connection indicator.

use huddle_client::{LinkState, Viewport};
use huddle_proto::{MessageId, RoomId};

use crate::{AppAction, AppEvent, KeyInput, MessageView};

/// Height of one rendered message row, used to report scroll distance.
pub const ROW_HEIGHT_PX: u32 = 24;

const HELP: &str = "Commands: /room <id>, /reply <msg id>, /cancel, /bot [name], /older, \
                    /retry, /leave, /quit";

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Room being shown. `None` until `/room`.
    active_room: Option<RoomId>,
    /// Link state of the active room.
    link: LinkState,
    /// Messages of the active room, ascending.
    messages: Vec<MessageView>,
    /// Older history can be loaded.
    has_more: bool,
    /// A message arrived while scrolled up.
    new_messages: bool,
    /// Rows scrolled up from the newest message.
    scroll_offset: usize,
    /// Reply target for the next send.
    replying_to: Option<MessageId>,
    /// Bot addressed by the next send.
    selected_bot: Option<String>,
    /// Compose line.
    input_buffer: String,
    /// Cursor position in characters.
    input_cursor: usize,
    /// Terminal dimensions (columns, rows).
    terminal_size: (u16, u16),
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
}

impl App {
    /// Create an App with no room open.
    pub fn new() -> Self {
        Self {
            active_room: None,
            link: LinkState::Disconnected,
            messages: Vec::new(),
            has_more: false,
            new_messages: false,
            scroll_offset: 0,
            replying_to: None,
            selected_bot: None,
            input_buffer: String::new(),
            input_cursor: 0,
            terminal_size: (80, 24),
            status_message: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Tick => vec![],
            AppEvent::Resize(cols, rows) => {
                self.terminal_size = (cols, rows);
                vec![AppAction::Render]
            },
            AppEvent::LinkChanged { room_id, state } => {
                if !self.is_active(room_id) {
                    return vec![];
                }
                if state == LinkState::Disconnected && self.link != LinkState::Disconnected {
                    self.status_message = Some("Disconnected. Type /retry to reconnect".into());
                }
                self.link = state;
                vec![AppAction::Render]
            },
            AppEvent::MessagesUpdated { room_id, messages, has_more } => {
                if !self.is_active(room_id) {
                    return vec![];
                }
                self.messages = messages;
                self.has_more = has_more;
                self.scroll_offset = self.scroll_offset.min(self.messages.len());
                vec![AppAction::Render]
            },
            AppEvent::ScrollToBottom { room_id } => {
                if !self.is_active(room_id) {
                    return vec![];
                }
                self.scroll_offset = 0;
                self.new_messages = false;
                vec![AppAction::Render]
            },
            AppEvent::NewMessages { room_id } => {
                if !self.is_active(room_id) {
                    return vec![];
                }
                self.new_messages = true;
                vec![AppAction::Render]
            },
            AppEvent::MessageSent => {
                self.clear_input();
                self.replying_to = None;
                self.selected_bot = None;
                vec![AppAction::Render]
            },
            AppEvent::BotSelected { name } => {
                self.status_message = Some(match &name {
                    Some(name) => format!("Addressing {name}"),
                    None => "No bot selected".to_string(),
                });
                self.selected_bot = name;
                vec![AppAction::Render]
            },
            AppEvent::Error { message } => {
                self.status_message = Some(format!("Error: {message}"));
                vec![AppAction::Render]
            },
        }
    }

    /// Set a status message to display to the user.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Switch to a room, discarding the current view.
    ///
    /// Reopening the active room keeps the view and only asks the session to
    /// reconnect if the link is down.
    pub fn open_room(&mut self, room_id: RoomId) -> Vec<AppAction> {
        if self.active_room == Some(room_id) {
            self.status_message = Some(format!("Already in room {room_id}"));
            return vec![AppAction::OpenRoom { room_id }, AppAction::Render];
        }

        self.active_room = Some(room_id);
        self.reset_view();
        self.status_message = Some(format!("Opening room {room_id}..."));
        vec![AppAction::OpenRoom { room_id }, AppAction::Render]
    }

    /// Leave the active room.
    pub fn close_room(&mut self) -> Vec<AppAction> {
        let Some(room_id) = self.active_room.take() else {
            self.status_message = Some("No room is open".into());
            return vec![AppAction::Render];
        };
        self.reset_view();
        self.status_message = Some(format!("Left room {room_id}"));
        vec![AppAction::CloseRoom, AppAction::Render]
    }

    /// Send text to the active room.
    pub fn send_message(&mut self, text: impl Into<String>) -> Vec<AppAction> {
        if self.active_room.is_none() {
            self.status_message = Some("Open a room with /room <id> first".into());
            return vec![AppAction::Render];
        }
        vec![AppAction::Send { text: text.into() }, AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    fn handle_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match key {
            KeyInput::Char(c) => {
                let at = self.byte_index();
                self.input_buffer.insert(at, c);
                self.input_cursor += 1;
                self.draft_changed()
            },
            KeyInput::Backspace => {
                if self.input_cursor == 0 {
                    return vec![];
                }
                self.input_cursor -= 1;
                let at = self.byte_index();
                self.input_buffer.remove(at);
                self.draft_changed()
            },
            KeyInput::Delete => {
                if self.input_cursor >= self.input_chars() {
                    return vec![];
                }
                let at = self.byte_index();
                self.input_buffer.remove(at);
                self.draft_changed()
            },
            KeyInput::Left => {
                self.input_cursor = self.input_cursor.saturating_sub(1);
                vec![AppAction::Render]
            },
            KeyInput::Right => {
                self.input_cursor = (self.input_cursor + 1).min(self.input_chars());
                vec![AppAction::Render]
            },
            KeyInput::Home => {
                self.input_cursor = 0;
                vec![AppAction::Render]
            },
            KeyInput::End => {
                self.input_cursor = self.input_chars();
                vec![AppAction::Render]
            },
            KeyInput::Up => self.scroll_up(),
            KeyInput::Down => self.scroll_down(),
            KeyInput::Enter => self.handle_enter(),
            KeyInput::Esc => vec![AppAction::Quit],
        }
    }

    /// Send the compose line or run a command.
    ///
    /// Plain text stays in the buffer until [`AppEvent::MessageSent`] so a
    /// rejected send can be edited and retried.
    fn handle_enter(&mut self) -> Vec<AppAction> {
        if self.input_buffer.trim().is_empty() {
            return vec![];
        }

        if let Some(command) = self.input_buffer.strip_prefix('/') {
            let command = command.to_string();
            self.clear_input();
            return self.handle_command(&command);
        }

        self.send_message(self.input_buffer.clone())
    }

    fn handle_command(&mut self, command: &str) -> Vec<AppAction> {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        match name {
            "room" => match rest.first().and_then(|id| id.parse::<RoomId>().ok()) {
                Some(room_id) => self.open_room(room_id),
                None => self.usage("/room <id>"),
            },
            "leave" => self.close_room(),
            "reply" => {
                if self.active_room.is_none() {
                    return self.usage("/room <id> first");
                }
                match rest.first().and_then(|id| id.parse::<MessageId>().ok()) {
                    Some(msg_id) => {
                        self.replying_to = Some(msg_id);
                        self.status_message = Some(format!("Replying to #{msg_id}"));
                        vec![AppAction::StartReply { msg_id }, AppAction::Render]
                    },
                    None => self.usage("/reply <msg id>"),
                }
            },
            "cancel" => {
                self.replying_to = None;
                self.status_message = None;
                vec![AppAction::CancelReply, AppAction::Render]
            },
            "bot" => {
                let name = rest.join(" ");
                let name = (!name.is_empty()).then_some(name);
                vec![AppAction::SelectBot { name }, AppAction::Render]
            },
            "older" => {
                if self.active_room.is_none() {
                    return self.usage("/room <id> first");
                }
                vec![AppAction::LoadOlder, AppAction::Render]
            },
            "retry" => {
                self.status_message = Some("Reconnecting...".into());
                vec![AppAction::RetryNow, AppAction::Render]
            },
            "quit" | "q" => vec![AppAction::Quit],
            "help" => {
                self.status_message = Some(HELP.into());
                vec![AppAction::Render]
            },
            other => {
                self.status_message = Some(format!("Unknown command /{other}. {HELP}"));
                vec![AppAction::Render]
            },
        }
    }

    fn scroll_up(&mut self) -> Vec<AppAction> {
        if self.scroll_offset < self.messages.len() {
            self.scroll_offset += 1;
        }
        if self.scroll_offset >= self.messages.len() && self.has_more && self.active_room.is_some()
        {
            return vec![AppAction::LoadOlder, AppAction::Render];
        }
        vec![AppAction::Render]
    }

    fn scroll_down(&mut self) -> Vec<AppAction> {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
        if self.scroll_offset == 0 {
            self.new_messages = false;
        }
        vec![AppAction::Render]
    }

    fn draft_changed(&self) -> Vec<AppAction> {
        if self.active_room.is_none() || self.input_buffer.starts_with('/') {
            return vec![AppAction::Render];
        }
        vec![AppAction::DraftChanged { text: self.input_buffer.clone() }, AppAction::Render]
    }

    fn usage(&mut self, usage: &str) -> Vec<AppAction> {
        self.status_message = Some(format!("Usage: {usage}"));
        vec![AppAction::Render]
    }

    fn reset_view(&mut self) {
        self.link = LinkState::Disconnected;
        self.messages.clear();
        self.has_more = false;
        self.new_messages = false;
        self.scroll_offset = 0;
        self.replying_to = None;
        self.selected_bot = None;
    }

    fn clear_input(&mut self) {
        self.input_buffer.clear();
        self.input_cursor = 0;
    }

    fn input_chars(&self) -> usize {
        self.input_buffer.chars().count()
    }

    fn byte_index(&self) -> usize {
        self.input_buffer
            .char_indices()
            .nth(self.input_cursor)
            .map_or(self.input_buffer.len(), |(at, _)| at)
    }

    fn is_active(&self, room_id: RoomId) -> bool {
        self.active_room == Some(room_id)
    }

    /// Currently selected room. `None` before `/room`.
    pub fn active_room(&self) -> Option<RoomId> {
        self.active_room
    }

    /// Link state of the active room.
    pub fn link_state(&self) -> LinkState {
        self.link
    }

    /// Messages of the active room, ascending.
    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    /// Older history can be loaded.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// A message arrived while scrolled up.
    pub fn has_new_messages(&self) -> bool {
        self.new_messages
    }

    /// Rows scrolled up from the newest message.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Scroll position as reported to the session.
    pub fn viewport(&self) -> Viewport {
        let rows = u32::try_from(self.scroll_offset).unwrap_or(u32::MAX);
        Viewport { distance_from_bottom_px: rows.saturating_mul(ROW_HEIGHT_PX) }
    }

    /// Reply target for the next send.
    pub fn replying_to(&self) -> Option<MessageId> {
        self.replying_to
    }

    /// Bot addressed by the next send.
    pub fn selected_bot(&self) -> Option<&str> {
        self.selected_bot.as_deref()
    }

    /// Input buffer contents.
    pub fn input_buffer(&self) -> &str {
        &self.input_buffer
    }

    /// Cursor position in characters.
    pub fn input_cursor(&self) -> usize {
        self.input_cursor
    }

    /// Terminal dimensions (columns, rows).
    pub fn terminal_size(&self) -> (u16, u16) {
        self.terminal_size
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
