//! Line rendering.
//!
//! A terminal in line mode cannot redraw, so [`Renderer`] remembers what it
//! already printed and turns each [`App`] state into the lines that are new:
//! room and link changes, unseen messages, resolved reply previews and status
//! messages.

use std::collections::BTreeMap;

use huddle_app::{App, MessageView, ReplyPreview};
use huddle_client::LinkState;
use huddle_proto::{MessageId, RoomId};

/// Tracks printed state between renders.
#[derive(Debug, Default)]
pub struct Renderer {
    room: Option<RoomId>,
    link: Option<LinkState>,
    status: Option<String>,
    /// Printed messages and the reply preview they were printed with
    shown: BTreeMap<MessageId, ReplyPreview>,
}

impl Renderer {
    /// Create a renderer that has printed nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for the current state.
    pub fn render(&mut self, app: &App) -> Vec<String> {
        let mut lines = Vec::new();

        if app.active_room() != self.room {
            self.room = app.active_room();
            self.link = None;
            self.shown.clear();
            if let Some(room_id) = self.room {
                lines.push(format!("== room {room_id} =="));
            }
        }

        if self.room.is_some() && self.link != Some(app.link_state()) {
            self.link = Some(app.link_state());
            lines.push(format!("[{}]", app.link_state()));
        }

        self.render_messages(app.messages(), &mut lines);

        let status = app.status_message().map(str::to_string);
        if status != self.status {
            if let Some(status) = &status {
                lines.push(format!("-- {status}"));
            }
            self.status = status;
        }

        lines
    }

    fn render_messages(&mut self, messages: &[MessageView], lines: &mut Vec<String>) {
        let newest_shown = self.shown.keys().next_back().copied();
        let mut older_header = false;

        for view in messages {
            match self.shown.get(&view.id) {
                None => {
                    if newest_shown.is_some_and(|newest| view.id < newest) && !older_header {
                        lines.push("-- earlier messages --".to_string());
                        older_header = true;
                    }
                    lines.extend(format_message(view));
                },
                Some(previous) if *previous != view.reply => {
                    if let Some(preview) = format_reply(&view.reply) {
                        lines.push(format!("#{} {preview}", view.id));
                    }
                },
                Some(_) => continue,
            }
            self.shown.insert(view.id, view.reply.clone());
        }
    }
}

/// A message as one or two lines: the reply preview, then the message.
pub fn format_message(view: &MessageView) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    if let Some(preview) = format_reply(&view.reply) {
        lines.push(format!("    {preview}"));
    }
    let tag = if view.is_bot { " [bot]" } else { "" };
    lines.push(format!("#{} {}{tag}: {}", view.id, view.sender, view.content));
    lines
}

fn format_reply(reply: &ReplyPreview) -> Option<String> {
    match reply {
        ReplyPreview::None => None,
        ReplyPreview::Loading { msg_id } => Some(format!("> #{msg_id} ...")),
        ReplyPreview::Quote { msg_id, sender, excerpt } => {
            Some(format!("> #{msg_id} {sender}: {excerpt}"))
        },
        ReplyPreview::Unavailable { msg_id } => Some(format!("> #{msg_id} (unavailable)")),
    }
}
