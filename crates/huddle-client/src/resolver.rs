//! Reply target lookups.
//!
//! Reply targets missing from the store are fetched by id in batches. An id is
//! in at most one request at a time, and an id a lookup could not produce is
//! never requested again.

use std::collections::{BTreeMap, BTreeSet};

use huddle_proto::{MessageId, RoomId};
use tracing::debug;

/// Batch lookup to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Correlates the response.
    pub request_id: u64,
    /// Room the ids belong to.
    pub room_id: RoomId,
    /// Ids to fetch, ascending.
    pub msg_ids: Vec<MessageId>,
}

/// Result of settling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOutcome {
    /// Every id the request asked for.
    pub requested: Vec<MessageId>,
    /// Ids now given up on.
    pub unavailable: Vec<MessageId>,
}

/// Tracks in-flight reply lookups for the active room.
#[derive(Debug, Clone, Default)]
pub struct ReplyResolver {
    in_flight: BTreeMap<u64, BTreeSet<MessageId>>,
    given_up: BTreeSet<MessageId>,
    next_request_id: u64,
}

impl ReplyResolver {
    /// Create a resolver with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unanswered requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// True if `id` is part of an unanswered request.
    pub fn is_in_flight(&self, id: MessageId) -> bool {
        self.in_flight.values().any(|ids| ids.contains(&id))
    }

    /// True if `id` will never be requested again.
    pub fn is_given_up(&self, id: MessageId) -> bool {
        self.given_up.contains(&id)
    }

    /// Build one request for the missing ids not already in flight or given
    /// up on. Returns `None` when nothing is left to ask for.
    pub fn schedule(
        &mut self,
        room_id: RoomId,
        missing: impl IntoIterator<Item = MessageId>,
    ) -> Option<BatchRequest> {
        let ids: BTreeSet<MessageId> = missing
            .into_iter()
            .filter(|id| !self.given_up.contains(id) && !self.is_in_flight(*id))
            .collect();

        if ids.is_empty() {
            return None;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let msg_ids: Vec<_> = ids.iter().copied().collect();
        self.in_flight.insert(request_id, ids);

        debug!(request_id, count = msg_ids.len(), "scheduling reply lookup");
        Some(BatchRequest { request_id, room_id, msg_ids })
    }

    /// A request was answered. Ids missing from `found` are given up on.
    ///
    /// Returns `None` for an unknown or already settled request.
    pub fn complete(&mut self, request_id: u64, found: &[MessageId]) -> Option<ResolverOutcome> {
        let ids = self.in_flight.remove(&request_id)?;

        let unavailable: Vec<_> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        self.given_up.extend(unavailable.iter().copied());

        Some(ResolverOutcome { requested: ids.into_iter().collect(), unavailable })
    }

    /// A request failed. All its ids are given up on.
    pub fn fail(&mut self, request_id: u64) -> Option<ResolverOutcome> {
        self.complete(request_id, &[])
    }

    /// Forget everything (room switch). Request ids keep increasing so late
    /// responses never match a new request.
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.given_up.clear();
    }
}
