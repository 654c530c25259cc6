//! Line-oriented terminal client for Huddle
//!
//! A thin shell over [`huddle_app::Driver`] that reads commands from stdin and
//! prints the conversation to stdout. All orchestration logic lives in the
//! generic [`huddle_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod line_driver;
pub mod render;

pub use huddle_app::{App, AppEvent, Driver, Runtime};
pub use line_driver::{CliError, LineDriver, TICK_INTERVAL};
pub use render::{Renderer, format_message};
