//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: Session bridge to the Client
//! - [`Driver`]: Platform-specific I/O

use std::collections::VecDeque;

use huddle_client::{Environment, SessionConfig};
use huddle_proto::RoomId;
use tracing::warn;

use crate::{App, AppAction, AppEvent, Bridge, Driver, Effect, NetworkEvent};

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App,
    bridge: Bridge<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(driver: D, env: E, config: SessionConfig) -> Self {
        Self { driver, app: App::new(), bridge: Bridge::new(env, config) }
    }

    /// Open a room as if the user typed `/room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to render.
    pub async fn open_room(&mut self, room_id: RoomId) -> Result<(), D::Error> {
        let actions = self.app.open_room(room_id);
        self.process_actions(actions).await?;
        Ok(())
    }

    /// Run the main event loop until the user quits.
    ///
    /// This is the core orchestration loop that:
    /// 1. Polls for input events from the driver
    /// 2. Feeds completed I/O back into the session
    /// 3. Drives reconnect and telemetry timers
    /// 4. Executes the resulting I/O effects through the driver
    ///
    /// On quit the session is logged out, so pending telemetry is flushed
    /// and every link is released before the driver stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app)?;

        loop {
            if self.process_cycle().await? {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        if let Some(event) = self.driver.poll_event().await? {
            let actions = self.app.handle(event);
            if self.process_actions(actions).await? {
                return Ok(true);
            }
        }

        while let Some(event) = self.driver.poll_network().await {
            if self.handle_network(event).await? {
                return Ok(true);
            }
        }

        let now = self.driver.now();
        let mut events = self.bridge.handle_tick(now);
        events.extend(self.execute_effects().await);
        self.process_events(events).await
    }

    /// Feed one I/O result into the session.
    ///
    /// Returns `true` if the application should quit.
    pub async fn handle_network(&mut self, event: NetworkEvent) -> Result<bool, D::Error> {
        let viewport = self.app.viewport();
        let mut events = self.bridge.handle_network(event, viewport);
        events.extend(self.execute_effects().await);
        self.process_events(events).await
    }

    /// Log out and stop the driver.
    pub async fn shutdown(&mut self) {
        let _ = self.bridge.logout();
        let _ = self.execute_effects().await;
        self.driver.stop();
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    async fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending: VecDeque<AppAction> = initial_actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                AppAction::Render => self.driver.render(&self.app)?,
                AppAction::Quit => return Ok(true),

                // Session operations go through the bridge
                AppAction::OpenRoom { .. }
                | AppAction::CloseRoom
                | AppAction::DraftChanged { .. }
                | AppAction::Send { .. }
                | AppAction::StartReply { .. }
                | AppAction::CancelReply
                | AppAction::SelectBot { .. }
                | AppAction::LoadOlder
                | AppAction::RetryNow => {
                    let mut events = self.bridge.process_app_action(action);
                    events.extend(self.execute_effects().await);
                    for event in events {
                        pending.extend(self.app.handle(event));
                    }
                },
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    async fn process_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        let mut actions = Vec::new();
        for event in events {
            actions.extend(self.app.handle(event));
        }
        self.process_actions(actions).await
    }

    /// Perform every effect the bridge accumulated.
    ///
    /// Dial and transmit failures are fed back as session events, so this
    /// loops until no new effects appear.
    async fn execute_effects(&mut self) -> Vec<AppEvent> {
        let mut events = Vec::new();

        loop {
            let effects = self.bridge.take_effects();
            if effects.is_empty() {
                return events;
            }

            for effect in effects {
                match effect {
                    Effect::Dial { room_id } => {
                        if let Err(e) = self.driver.dial(room_id).await {
                            warn!(room_id, error = %e, "dial failed");
                            let down = NetworkEvent::LinkDown { room_id, reason: e.to_string() };
                            events.extend(self.bridge.handle_network(down, self.app.viewport()));
                        }
                    },
                    Effect::Transmit { room_id, frame } => {
                        if let Err(e) = self.driver.transmit(room_id, frame).await {
                            warn!(room_id, error = %e, "transmit failed");
                            events.push(AppEvent::Error { message: e.to_string() });
                        }
                    },
                    Effect::Release { room_id } => self.driver.release(room_id),
                    Effect::FetchHistory { kind, query } => self.driver.fetch_history(kind, query),
                    Effect::FetchReplies(request) => self.driver.fetch_replies(request),
                    Effect::FetchRoster { room_id } => self.driver.fetch_roster(room_id),
                    Effect::SubmitTelemetry { batch_id, events: batch, attempt } => {
                        self.driver.submit_telemetry(batch_id, batch, attempt);
                    },
                    Effect::SubmitTelemetryEvent(event) => {
                        self.driver.submit_telemetry_event(event);
                    },
                }
            }
        }
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
