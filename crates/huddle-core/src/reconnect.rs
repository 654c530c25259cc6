//! Reconnection state machine.
//!
//! Drives a room's link through connect, retry and give-up. Uses the action
//! pattern: methods take time (and externally sampled jitter) as input and
//! return actions for the driver to execute, so the backoff schedule is fully
//! deterministic under test.
//!
//! # Retry schedule
//!
//! After the `n`th consecutive failure (`n` counted from zero) the controller
//! waits `min(base * 2^n, max_delay) + jitter` before dialing again. Once
//! `max_attempts` retries have failed, or while the network is offline, it
//! parks in [`LinkState::Disconnected`] until [`ReconnectController::set_online`]
//! or [`ReconnectController::retry_now`] resets the counter.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{LinkError, LinkState};

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Ceiling on the exponential part of the delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to each delay.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Retries scheduled before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling on the exponential part of the delay
    pub max_delay: Duration,
    /// Upper bound of the jitter added to each delay
    pub max_jitter: Duration,
    /// Retries scheduled before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Actions returned by the reconnection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Open a new link now.
    Dial,
    /// A retry was scheduled. [`ReconnectController::tick`] emits
    /// [`ReconnectAction::Dial`] once `delay` has elapsed.
    ScheduleRetry {
        /// Retry number, starting at 1
        attempt: u32,
        /// Wait before dialing, jitter included
        delay: Duration,
    },
    /// A link came back after a previous success. History must be refetched
    /// to cover messages missed while disconnected.
    CatchUp,
    /// Stopped retrying. Only an online event or a manual retry restarts.
    GiveUp {
        /// Why retrying stopped
        error: LinkError,
    },
    /// Observable state changed.
    StateChanged(LinkState),
}

/// Reconnection state machine for one room link.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
#[derive(Debug, Clone)]
pub struct ReconnectController<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ReconnectConfig,
    state: LinkState,
    /// Retries scheduled since the last success or reset
    attempt: u32,
    online: bool,
    /// A room is open and wants a link
    wanted: bool,
    /// At least one success since the room was opened
    ever_connected: bool,
    /// When the pending retry was scheduled, and its delay
    pending_retry: Option<(I, Duration)>,
}

impl<I> ReconnectController<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a controller in [`LinkState::Disconnected`], network online.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: LinkState::Disconnected,
            attempt: 0,
            online: true,
            wanted: false,
            ever_connected: false,
            pending_retry: None,
        }
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Retries scheduled since the last success or reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Last known network availability.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Active configuration.
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Exponential part of the delay for the given zero-based failure count.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.config.base_delay.saturating_mul(factor).min(self.config.max_delay)
    }

    /// Time left until the pending retry is due.
    pub fn retry_due_in(&self, now: I) -> Option<Duration> {
        let (scheduled_at, delay) = self.pending_retry?;
        let elapsed = if now >= scheduled_at { now - scheduled_at } else { Duration::ZERO };
        Some(delay.saturating_sub(elapsed))
    }

    /// Request a link for the open room.
    ///
    /// Dials when disconnected and online. A link that is connected,
    /// connecting or waiting for a retry is left alone.
    pub fn connect(&mut self) -> Vec<ReconnectAction> {
        self.wanted = true;

        if self.state != LinkState::Disconnected {
            return Vec::new();
        }
        if !self.online {
            debug!("connect deferred, network offline");
            return Vec::new();
        }

        self.dial()
    }

    /// The dialed link is established.
    ///
    /// Resets the retry counter. Emits [`ReconnectAction::CatchUp`] on every
    /// success after the first one.
    ///
    /// # Errors
    ///
    /// - `LinkError::InvalidState` if no dial is in progress
    pub fn on_connected(&mut self) -> Result<Vec<ReconnectAction>, LinkError> {
        if self.state != LinkState::Connecting {
            return Err(LinkError::InvalidState {
                state: self.state,
                operation: "complete connect".to_string(),
            });
        }

        let mut actions = self.transition(LinkState::Connected);
        self.attempt = 0;
        self.pending_retry = None;

        if self.ever_connected {
            info!("link restored, requesting catch-up");
            actions.push(ReconnectAction::CatchUp);
        }
        self.ever_connected = true;

        Ok(actions)
    }

    /// The dial failed or an established link was lost.
    ///
    /// `jitter` is sampled by the caller and clamped to the configured
    /// maximum. Failures reported while no link is live are ignored.
    pub fn on_failure(&mut self, now: I, jitter: Duration) -> Vec<ReconnectAction> {
        if !self.state.is_live() {
            return Vec::new();
        }

        if !self.wanted {
            return self.transition(LinkState::Disconnected);
        }

        if !self.online {
            return self.give_up(LinkError::Offline);
        }

        if self.attempt >= self.config.max_attempts {
            let attempts = self.attempt;
            return self.give_up(LinkError::RetriesExhausted { attempts });
        }

        let delay = self.backoff_delay(self.attempt) + jitter.min(self.config.max_jitter);
        self.attempt += 1;
        self.pending_retry = Some((now, delay));

        debug!(attempt = self.attempt, ?delay, "scheduling reconnect");

        let mut actions = self.transition(LinkState::Reconnecting);
        actions.push(ReconnectAction::ScheduleRetry { attempt: self.attempt, delay });
        actions
    }

    /// Process timeouts. Dials once a scheduled retry is due.
    pub fn tick(&mut self, now: I) -> Vec<ReconnectAction> {
        if self.state != LinkState::Reconnecting {
            return Vec::new();
        }

        match self.retry_due_in(now) {
            Some(remaining) if remaining.is_zero() => self.dial(),
            _ => Vec::new(),
        }
    }

    /// Network availability changed.
    ///
    /// Going offline cancels a pending retry. Coming back online resets the
    /// retry counter and dials if a link is wanted. A dial in flight is left
    /// to succeed or fail on its own.
    pub fn set_online(&mut self, online: bool) -> Vec<ReconnectAction> {
        if online == self.online {
            return Vec::new();
        }
        self.online = online;

        if !online {
            if self.state == LinkState::Reconnecting {
                return self.give_up(LinkError::Offline);
            }
            return Vec::new();
        }

        self.attempt = 0;
        if self.wanted && matches!(self.state, LinkState::Disconnected | LinkState::Reconnecting) {
            return self.dial();
        }
        Vec::new()
    }

    /// Manual retry. Resets the counter and dials immediately.
    pub fn retry_now(&mut self) -> Vec<ReconnectAction> {
        self.attempt = 0;
        if !self.wanted {
            return Vec::new();
        }
        match self.state {
            LinkState::Disconnected | LinkState::Reconnecting => self.dial(),
            LinkState::Connecting | LinkState::Connected => Vec::new(),
        }
    }

    /// The room was closed. Forget all progress.
    pub fn shutdown(&mut self) -> Vec<ReconnectAction> {
        self.wanted = false;
        self.ever_connected = false;
        self.attempt = 0;
        self.pending_retry = None;

        if self.state == LinkState::Disconnected {
            return Vec::new();
        }
        self.transition(LinkState::Disconnected)
    }

    fn dial(&mut self) -> Vec<ReconnectAction> {
        self.pending_retry = None;
        let mut actions = self.transition(LinkState::Connecting);
        actions.push(ReconnectAction::Dial);
        actions
    }

    fn give_up(&mut self, error: LinkError) -> Vec<ReconnectAction> {
        warn!(%error, "reconnect stopped");
        self.pending_retry = None;
        let mut actions = self.transition(LinkState::Disconnected);
        actions.push(ReconnectAction::GiveUp { error });
        actions
    }

    fn transition(&mut self, to: LinkState) -> Vec<ReconnectAction> {
        if self.state == to {
            return Vec::new();
        }
        debug!(from = %self.state, %to, "link state");
        self.state = to;
        vec![ReconnectAction::StateChanged(to)]
    }
}

impl<I> Default for ReconnectController<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ReconnectController {
        let mut ctl = ReconnectController::default();
        let _ = ctl.connect();
        ctl.on_connected().unwrap();
        ctl
    }

    #[test]
    fn connect_dials_once() {
        let mut ctl: ReconnectController = ReconnectController::default();

        let actions = ctl.connect();
        assert_eq!(actions, vec![
            ReconnectAction::StateChanged(LinkState::Connecting),
            ReconnectAction::Dial
        ]);

        assert!(ctl.connect().is_empty());
        assert_eq!(ctl.state(), LinkState::Connecting);
    }

    #[test]
    fn first_success_has_no_catch_up() {
        let mut ctl: ReconnectController = ReconnectController::default();
        let _ = ctl.connect();

        let actions = ctl.on_connected().unwrap();
        assert_eq!(actions, vec![ReconnectAction::StateChanged(LinkState::Connected)]);
    }

    #[test]
    fn on_connected_requires_dial() {
        let mut ctl: ReconnectController = ReconnectController::default();

        let result = ctl.on_connected();
        assert!(matches!(result, Err(LinkError::InvalidState { .. })));
    }

    #[test]
    fn lost_link_retries_then_catches_up() {
        let t0 = Instant::now();
        let mut ctl = connected();

        let actions = ctl.on_failure(t0, Duration::from_millis(250));
        assert_eq!(actions, vec![
            ReconnectAction::StateChanged(LinkState::Reconnecting),
            ReconnectAction::ScheduleRetry { attempt: 1, delay: Duration::from_millis(1250) }
        ]);

        assert!(ctl.tick(t0 + Duration::from_millis(1249)).is_empty());
        let actions = ctl.tick(t0 + Duration::from_millis(1250));
        assert!(actions.contains(&ReconnectAction::Dial));

        let actions = ctl.on_connected().unwrap();
        assert!(actions.contains(&ReconnectAction::CatchUp));
        assert_eq!(ctl.attempt(), 0);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let t0 = Instant::now();
        let mut ctl: ReconnectController = ReconnectController::default();
        let _ = ctl.connect();

        let mut now = t0;
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            let actions = ctl.on_failure(now, Duration::ZERO);
            let Some(ReconnectAction::ScheduleRetry { delay, .. }) = actions.last().cloned() else {
                unreachable!("expected a scheduled retry, got {actions:?}");
            };
            now += delay;
            let _ = ctl.tick(now);
        }

        let actions = ctl.on_failure(now, Duration::ZERO);
        assert_eq!(ctl.state(), LinkState::Disconnected);
        assert!(actions.contains(&ReconnectAction::GiveUp {
            error: LinkError::RetriesExhausted { attempts: DEFAULT_MAX_ATTEMPTS }
        }));
    }

    #[test]
    fn offline_failure_does_not_schedule() {
        let t0 = Instant::now();
        let mut ctl = connected();

        assert!(ctl.set_online(false).is_empty());
        let actions = ctl.on_failure(t0, Duration::ZERO);

        assert_eq!(ctl.state(), LinkState::Disconnected);
        assert!(actions.contains(&ReconnectAction::GiveUp { error: LinkError::Offline }));
    }

    #[test]
    fn going_offline_cancels_pending_retry() {
        let t0 = Instant::now();
        let mut ctl = connected();
        let _ = ctl.on_failure(t0, Duration::ZERO);

        let _ = ctl.set_online(false);
        assert_eq!(ctl.state(), LinkState::Disconnected);
        assert!(ctl.tick(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn online_event_resets_counter_and_dials() {
        let t0 = Instant::now();
        let mut ctl = connected();
        let _ = ctl.on_failure(t0, Duration::ZERO);
        let _ = ctl.set_online(false);

        let actions = ctl.set_online(true);
        assert!(actions.contains(&ReconnectAction::Dial));
        assert_eq!(ctl.attempt(), 0);
    }

    #[test]
    fn retry_now_after_give_up() {
        let t0 = Instant::now();
        let mut ctl = connected();
        let _ = ctl.set_online(false);
        let _ = ctl.on_failure(t0, Duration::ZERO);
        let _ = ctl.set_online(true);
        let _ = ctl.on_failure(t0, Duration::ZERO);

        let actions = ctl.retry_now();
        assert!(actions.contains(&ReconnectAction::Dial));
        assert_eq!(ctl.state(), LinkState::Connecting);
    }

    #[test]
    fn shutdown_stops_everything() {
        let mut ctl = connected();

        let actions = ctl.shutdown();
        assert_eq!(actions, vec![ReconnectAction::StateChanged(LinkState::Disconnected)]);
        assert!(ctl.retry_now().is_empty());
        assert!(ctl.set_online(false).is_empty());
        assert!(ctl.set_online(true).is_empty());
    }

    #[test]
    fn jitter_is_clamped() {
        let t0 = Instant::now();
        let mut ctl = connected();

        let actions = ctl.on_failure(t0, Duration::from_secs(10));
        assert!(actions.contains(&ReconnectAction::ScheduleRetry {
            attempt: 1,
            delay: Duration::from_secs(2)
        }));
    }

    #[test]
    fn backoff_saturates() {
        let ctl: ReconnectController = ReconnectController::default();
        assert_eq!(ctl.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(ctl.backoff_delay(4), Duration::from_secs(16));
        assert_eq!(ctl.backoff_delay(5), Duration::from_secs(30));
        assert_eq!(ctl.backoff_delay(64), Duration::from_secs(30));
    }
}
