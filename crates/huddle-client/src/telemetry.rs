//! Typing activity telemetry.
//!
//! A self-contained pipeline: events are queued, collapsed, and submitted in
//! batches. Failed batches are retried at a fixed interval, then submitted
//! event by event. Nothing here ever blocks or fails message sending.

use std::{
    collections::BTreeMap,
    ops::Sub,
    time::{Duration, Instant},
};

use huddle_proto::api::TrackedEvent;
use tracing::{debug, warn};

/// Time between periodic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Queue length that triggers an immediate flush.
pub const DEFAULT_MAX_BATCH: usize = 20;

/// Submissions of one batch before falling back to single events.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Wait between submissions of a failed batch.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Time between periodic flushes
    pub flush_interval: Duration,
    /// Queue length that triggers an immediate flush
    pub max_batch: usize,
    /// Submissions of one batch before falling back to single events
    pub max_attempts: u32,
    /// Wait between submissions of a failed batch
    pub retry_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Why the queue was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Flush interval elapsed.
    Interval,
    /// Queue reached the batch size.
    BatchFull,
    /// A chat message was sent.
    MessageSent,
    /// The page is going away.
    Unload,
}

/// Submissions for the driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryAction {
    /// POST the events as one batch and report the outcome with `batch_id`.
    SubmitBatch {
        /// Correlates the outcome
        batch_id: u64,
        /// Events in the batch
        events: Vec<TrackedEvent>,
        /// Submission number, starting at 1
        attempt: u32,
    },
    /// POST one event. Fire and forget.
    SubmitEvent(TrackedEvent),
}

#[derive(Debug, Clone)]
struct InFlight<I> {
    events: Vec<TrackedEvent>,
    attempt: u32,
    /// Set while waiting to resubmit
    failed_at: Option<I>,
}

/// Typing activity batcher.
///
/// This is a pure state machine - no I/O, no Environment storage.
#[derive(Debug, Clone)]
pub struct TelemetryBatcher<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: TelemetryConfig,
    queue: Vec<TrackedEvent>,
    last_flush: Option<I>,
    batches: BTreeMap<u64, InFlight<I>>,
    next_batch_id: u64,
}

impl<I> TelemetryBatcher<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty batcher.
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            queue: Vec::new(),
            last_flush: None,
            batches: BTreeMap::new(),
            next_batch_id: 0,
        }
    }

    /// Queued events not yet submitted.
    pub fn queued(&self) -> &[TrackedEvent] {
        &self.queue
    }

    /// Batches awaiting an outcome or a retry.
    pub fn batches_in_flight(&self) -> usize {
        self.batches.len()
    }

    /// Queue an event.
    ///
    /// If the newest queued event is for the same room and one content
    /// contains the other, the new event replaces it. Reaching the batch
    /// size flushes immediately.
    pub fn record(&mut self, event: TrackedEvent, now: I) -> Vec<TelemetryAction> {
        self.last_flush.get_or_insert(now);

        match self.queue.last_mut() {
            Some(last) if collapses(last, &event) => *last = event,
            _ => self.queue.push(event),
        }

        if self.queue.len() >= self.config.max_batch {
            return self.flush(FlushReason::BatchFull, now);
        }
        Vec::new()
    }

    /// Submit everything queued as one batch.
    pub fn flush(&mut self, reason: FlushReason, now: I) -> Vec<TelemetryAction> {
        self.last_flush = Some(now);
        if self.queue.is_empty() {
            return Vec::new();
        }

        self.next_batch_id += 1;
        let batch_id = self.next_batch_id;
        let events = std::mem::take(&mut self.queue);

        debug!(batch_id, count = events.len(), ?reason, "flushing telemetry");
        self.batches
            .insert(batch_id, InFlight { events: events.clone(), attempt: 1, failed_at: None });

        vec![TelemetryAction::SubmitBatch { batch_id, events, attempt: 1 }]
    }

    /// Outcome of a batch submission.
    ///
    /// A failure schedules a resubmission after the retry interval. After the
    /// last attempt fails, each event is submitted on its own, once.
    pub fn on_result(&mut self, batch_id: u64, ok: bool, now: I) -> Vec<TelemetryAction> {
        if ok {
            self.batches.remove(&batch_id);
            return Vec::new();
        }

        let Some(batch) = self.batches.get_mut(&batch_id) else {
            return Vec::new();
        };

        if batch.attempt < self.config.max_attempts {
            batch.failed_at = Some(now);
            return Vec::new();
        }

        let Some(batch) = self.batches.remove(&batch_id) else {
            return Vec::new();
        };
        warn!(batch_id, count = batch.events.len(), "telemetry batch failed, sending singly");
        batch.events.into_iter().map(TelemetryAction::SubmitEvent).collect()
    }

    /// Periodic flush and due retries.
    pub fn tick(&mut self, now: I) -> Vec<TelemetryAction> {
        let mut actions = Vec::new();
        let retry_interval = self.config.retry_interval;

        for (&batch_id, batch) in &mut self.batches {
            let Some(failed_at) = batch.failed_at else { continue };
            if elapsed(now, failed_at) < retry_interval {
                continue;
            }
            batch.failed_at = None;
            batch.attempt += 1;
            actions.push(TelemetryAction::SubmitBatch {
                batch_id,
                events: batch.events.clone(),
                attempt: batch.attempt,
            });
        }

        let last = *self.last_flush.get_or_insert(now);
        if elapsed(now, last) >= self.config.flush_interval {
            actions.extend(self.flush(FlushReason::Interval, now));
        }

        actions
    }
}

impl<I> Default for TelemetryBatcher<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

fn collapses(last: &TrackedEvent, next: &TrackedEvent) -> bool {
    last.event_type == next.event_type
        && last.group_id == next.group_id
        && (next.content.contains(&last.content) || last.content.contains(&next.content))
}

fn elapsed<I>(now: I, since: I) -> Duration
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    if now >= since { now - since } else { Duration::ZERO }
}
