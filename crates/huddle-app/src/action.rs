//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use huddle_proto::{MessageId, RoomId};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Switch to a room.
    OpenRoom {
        /// Room to open.
        room_id: RoomId,
    },

    /// Leave the active room and drop its link.
    CloseRoom,

    /// Compose line changed.
    DraftChanged {
        /// Current text.
        text: String,
    },

    /// Send the compose line.
    Send {
        /// Text to send.
        text: String,
    },

    /// Reply to a message with the next send.
    StartReply {
        /// Message being replied to.
        msg_id: MessageId,
    },

    /// Drop the reply in progress.
    CancelReply,

    /// Address a bot by name, or clear the choice.
    SelectBot {
        /// Bot display name.
        name: Option<String>,
    },

    /// Load the page before the oldest loaded message.
    LoadOlder,

    /// Reconnect now.
    RetryNow,
}
