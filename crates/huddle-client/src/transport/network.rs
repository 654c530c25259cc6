//! Network availability.
//!
//! A terminal has no `online`/`offline` signal, so [`NetworkMonitor`] derives
//! one: it periodically opens a TCP connection to the broker's host and
//! reports when the outcome flips. The session starts out assuming the
//! network is up, so nothing is reported until the first failure.

use std::time::Duration;

use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, timeout},
};
use tracing::{debug, info};

/// Time between reachability checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// How long one connection attempt may take before it counts as a failure.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of a reachability check that differs from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The host accepts connections again.
    Reachable,
    /// The host stopped accepting connections.
    Unreachable,
}

/// Background task checking whether the broker host accepts connections.
///
/// The task stops when the handle is dropped or the receiver goes away.
#[derive(Debug)]
pub struct NetworkMonitor {
    task: JoinHandle<()>,
}

impl NetworkMonitor {
    /// Start checking `target` (`host:port`). Must be called from within a
    /// tokio runtime.
    pub fn spawn(
        target: String,
        interval: Duration,
        check_timeout: Duration,
        events: mpsc::UnboundedSender<Reachability>,
    ) -> Self {
        let task = tokio::spawn(run(target, interval, check_timeout, events));
        Self { task }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    target: String,
    interval: Duration,
    check_timeout: Duration,
    events: mpsc::UnboundedSender<Reachability>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reachable = true;

    loop {
        ticker.tick().await;

        let now_reachable = is_reachable(&target, check_timeout).await;
        if now_reachable == reachable {
            continue;
        }
        reachable = now_reachable;

        let change = if reachable { Reachability::Reachable } else { Reachability::Unreachable };
        info!(target = %target, ?change, "network availability changed");
        if events.send(change).is_err() {
            debug!("network monitor receiver gone");
            return;
        }
    }
}

async fn is_reachable(target: &str, check_timeout: Duration) -> bool {
    matches!(timeout(check_timeout, TcpStream::connect(target)).await, Ok(Ok(_)))
}
