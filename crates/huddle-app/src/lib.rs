//! Application layer for Huddle
//!
//! Pure state machines and a generic runtime for chat front ends. The same
//! orchestration code runs in the terminal client and in deterministic
//! simulation.
//!
//! # Components
//!
//! - [`App`]: UI state machine (input line, slash commands, message view)
//! - [`Bridge`]: Protocol bridge (translates App actions to Client events and
//!   Client actions to App events and I/O [`Effect`]s)
//! - [`Driver`]: Trait for platform-specific I/O
//! - [`Runtime`]: Generic orchestration loop using a Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod bridge;
mod driver;
mod event;
mod input;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::{App, ROW_HEIGHT_PX};
pub use bridge::{Bridge, Effect};
pub use driver::Driver;
pub use event::{AppEvent, NetworkEvent};
pub use input::KeyInput;
pub use runtime::Runtime;
pub use state::{EXCERPT_CHARS, MessageView, ReplyPreview};
