//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use huddle_client::{BatchRequest, PageKind};
use huddle_proto::{HistoryQuery, OutboundFrame, RoomId, api::TrackedEvent};

use crate::{App, AppEvent, NetworkEvent};

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the terminal client and simulation.
///
/// Requests (`dial`, `fetch_*`, `submit_*`) must not wait for the server.
/// Their outcomes are reported later through [`Driver::poll_network`], tagged
/// with the room or request they were made for.
///
/// # Implementations
///
/// - **CLI**: stdin lines for input, STOMP links and the HTTP API for I/O
/// - **Simulation**: in-memory backend with scripted delays and failures
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Poll for the next input event.
    ///
    /// Returns available events or `None` if no events are ready.
    fn poll_event(&mut self) -> impl Future<Output = Result<Option<AppEvent>, Self::Error>> + Send;

    /// Next completed I/O result, or `None` if nothing is ready.
    fn poll_network(&mut self) -> impl Future<Output = Option<NetworkEvent>> + Send;

    /// Acquire the room's link, reusing a live one.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot even be started. Connection
    /// failures after that are reported as [`NetworkEvent::LinkDown`].
    fn dial(&mut self, room_id: RoomId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Publish a message on the room's link.
    ///
    /// # Errors
    ///
    /// Returns an error if the room has no link.
    fn transmit(
        &mut self,
        room_id: RoomId,
        frame: OutboundFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the room's link, or every link when `None`.
    fn release(&mut self, room_id: Option<RoomId>);

    /// Start fetching a history page.
    fn fetch_history(&mut self, kind: PageKind, query: HistoryQuery);

    /// Start a batch lookup of reply targets.
    fn fetch_replies(&mut self, request: BatchRequest);

    /// Start fetching the room's members and bots.
    fn fetch_roster(&mut self, room_id: RoomId);

    /// Start submitting a telemetry batch.
    fn submit_telemetry(&mut self, batch_id: u64, events: Vec<TrackedEvent>, attempt: u32);

    /// Submit one telemetry event, ignoring the outcome.
    fn submit_telemetry_event(&mut self, event: TrackedEvent);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
