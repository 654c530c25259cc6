//! Whole-session simulation.
//!
//! [`Simulation`] runs the production [`Runtime`] against a [`SimDriver`] and
//! checks the standard invariants after every cycle.

use std::time::Duration;

use huddle_app::{App, Runtime};
use huddle_client::{Client, SessionConfig};
use huddle_proto::RoomId;

use crate::{InvariantRegistry, SessionSnapshot, SimBackend, SimDriver, SimDriverError, SimEnv};

/// Cycles [`Simulation::settle`] runs before giving up on quiescence.
pub const MAX_SETTLE_CYCLES: usize = 10_000;

/// A session driven through the generic runtime in virtual time.
pub struct Simulation {
    runtime: Runtime<SimDriver, SimEnv>,
    driver: SimDriver,
    env: SimEnv,
    invariants: InvariantRegistry,
    quit: bool,
}

impl Simulation {
    /// Session for `config.user_id` against `backend`, with RNG `seed`.
    pub fn new(seed: u64, backend: SimBackend, config: SessionConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let driver = SimDriver::new(env.clone(), backend);
        let runtime = Runtime::new(driver.clone(), env.clone(), config);
        Self { runtime, driver, env, invariants: InvariantRegistry::standard(), quit: false }
    }

    /// Handle to the driver for injecting input and faults.
    pub fn driver(&self) -> &SimDriver {
        &self.driver
    }

    /// Shared virtual environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// UI state.
    pub fn app(&self) -> &App {
        self.runtime.app()
    }

    /// Session client behind the UI.
    pub fn client(&self) -> &Client<SimEnv> {
        self.runtime.bridge().client()
    }

    /// True once the user quit.
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Capture the observable session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(self.app(), self.client())
    }

    /// Open a room and process everything that follows.
    pub async fn open_room(&mut self, room_id: RoomId) -> Result<(), SimDriverError> {
        self.runtime.open_room(room_id).await?;
        self.check("after open_room");
        self.settle().await
    }

    /// Type a line, press Enter, and process everything that follows.
    pub async fn type_line(&mut self, line: &str) -> Result<(), SimDriverError> {
        self.driver.type_line(line);
        self.settle().await
    }

    /// Run one runtime cycle. Quitting logs out and stops the driver.
    pub async fn step(&mut self) -> Result<(), SimDriverError> {
        if self.quit {
            return Ok(());
        }
        if self.runtime.process_cycle().await? {
            self.quit = true;
            self.runtime.shutdown().await;
            return Ok(());
        }
        self.check("after step");
        Ok(())
    }

    /// Run cycles until no input or responses are waiting.
    pub async fn settle(&mut self) -> Result<(), SimDriverError> {
        for _ in 0..MAX_SETTLE_CYCLES {
            self.step().await?;
            if self.quit || !self.driver.has_pending() {
                return Ok(());
            }
        }
        Err(SimDriverError(format!("not settled after {MAX_SETTLE_CYCLES} cycles")))
    }

    /// Move virtual time forward, then settle.
    pub async fn advance(&mut self, by: Duration) -> Result<(), SimDriverError> {
        self.env.advance(by);
        self.step().await?;
        self.settle().await
    }

    /// Advance in `step` increments for `total`, settling after each.
    pub async fn run_for(&mut self, total: Duration, step: Duration) -> Result<(), SimDriverError> {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.advance(step).await?;
            elapsed += step;
        }
        Ok(())
    }

    fn check(&self, context: &str) {
        self.invariants.assert_all(&self.snapshot(), context);
    }
}
