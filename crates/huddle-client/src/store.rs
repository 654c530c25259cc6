//! Message store for the active room.
//!
//! Holds the room's messages ordered by id, with at most one entry per id.
//! Merging is commutative and idempotent: history pages and live pushes may
//! arrive in any order and any number of times, and the resulting sequence is
//! the same.
//!
//! Reply targets are tracked alongside. A message replying to an id that is
//! not loaded waits in [`ReplyState::Pending`] until the target arrives
//! locally or a batch lookup answers for it.

use std::collections::{BTreeMap, BTreeSet};

use huddle_proto::{HistoryQuery, Message, MessageId, RoomId};
use tracing::{debug, warn};

/// A viewport within this many pixels of the bottom follows new messages.
pub const NEAR_BOTTOM_PX: u32 = 300;

/// Viewport measurement taken before a live message is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    /// Pixels between the visible bottom edge and the end of the list.
    pub distance_from_bottom_px: u32,
}

impl Viewport {
    /// Viewport scrolled all the way down.
    pub const AT_BOTTOM: Self = Self { distance_from_bottom_px: 0 };

    /// True if new messages should scroll into view.
    pub fn is_near_bottom(self) -> bool {
        self.distance_from_bottom_px <= NEAR_BOTTOM_PX
    }
}

/// What the view should do after a live insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollHint {
    /// Nothing was inserted.
    None,
    /// Follow the new message.
    ScrollToBottom,
    /// Keep position and flag that a new message is available.
    NewMessageIndicator,
}

/// Which history page a request or response is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Newest page, loaded when the room opens.
    Initial,
    /// Page before the oldest loaded message.
    Older,
    /// Newest page, refetched after a reconnect.
    CatchUp,
}

/// Resolution state of a message's reply target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyState {
    /// Not a reply.
    None,
    /// Target not loaded yet.
    Pending,
    /// Target attached.
    Resolved(Box<Message>),
    /// Lookup failed or came back without the target. Never retried, but a
    /// later local arrival of the target still resolves it.
    Unavailable,
}

impl ReplyState {
    /// True while waiting for the target.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Attached target, if resolved.
    pub fn target(&self) -> Option<&Message> {
        match self {
            Self::Resolved(target) => Some(target),
            _ => None,
        }
    }
}

/// A message plus its client-side reply state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    message: Message,
    reply: ReplyState,
}

impl StoredMessage {
    /// The message as received.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Message id.
    pub fn id(&self) -> MessageId {
        self.message.id
    }

    /// Reply target resolution.
    pub fn reply(&self) -> &ReplyState {
        &self.reply
    }
}

/// Outcome of merging messages into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingest {
    /// Ids inserted by this call, ascending.
    pub inserted: Vec<MessageId>,
    /// Reply targets still missing locally after the merge, ascending and
    /// unique. These need a batch lookup.
    pub missing_replies: Vec<MessageId>,
    /// Entries whose reply target was attached by this merge.
    pub resolved_locally: usize,
    /// Messages for another room, dropped.
    pub rejected: usize,
}

impl Ingest {
    /// True if the visible sequence changed.
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || self.resolved_locally > 0
    }
}

/// Outcome of applying a batch lookup response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Entries whose reply target was attached.
    pub resolved: usize,
    /// Entries marked unavailable.
    pub unavailable: usize,
}

/// Ordered, deduplicated messages of the active room.
///
/// # Invariants
///
/// - Every entry belongs to [`Self::room_id`]
/// - Ids are unique and iteration is ascending by id
/// - An entry is `Pending` only while its target is absent locally and not
///   known to be unavailable
/// - At most one history request is in flight
#[derive(Debug, Clone)]
pub struct MessageStore {
    room_id: Option<RoomId>,
    page_size: usize,
    messages: BTreeMap<MessageId, StoredMessage>,
    /// Reply target -> ids of entries waiting for it
    waiting: BTreeMap<MessageId, BTreeSet<MessageId>>,
    /// Targets attached from lookups, not part of the sequence
    fetched: BTreeMap<MessageId, Message>,
    /// Targets a lookup answered without
    unavailable: BTreeSet<MessageId>,
    has_more: bool,
    initial_loaded: bool,
    loading: Option<PageKind>,
    catch_up_queued: bool,
}

impl MessageStore {
    /// Create an empty store with no active room.
    pub fn new(page_size: usize) -> Self {
        Self {
            room_id: None,
            page_size: page_size.max(1),
            messages: BTreeMap::new(),
            waiting: BTreeMap::new(),
            fetched: BTreeMap::new(),
            unavailable: BTreeSet::new(),
            has_more: true,
            initial_loaded: false,
            loading: None,
            catch_up_queued: false,
        }
    }

    /// Active room.
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    /// Messages requested per history page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Clear and make `room_id` the active room.
    pub fn switch_room(&mut self, room_id: RoomId) {
        self.clear();
        self.room_id = Some(room_id);
    }

    /// Discard all messages and pending resolutions, and leave the room.
    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            debug!(room_id = ?self.room_id, count = self.messages.len(), "clearing store");
        }
        self.room_id = None;
        self.messages.clear();
        self.waiting.clear();
        self.fetched.clear();
        self.unavailable.clear();
        self.has_more = true;
        self.initial_loaded = false;
        self.loading = None;
        self.catch_up_queued = false;
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if no messages are loaded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in ascending id order.
    pub fn messages(&self) -> impl Iterator<Item = &StoredMessage> {
        self.messages.values()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.keys().copied().collect()
    }

    /// Look up a message by id.
    pub fn get(&self, id: MessageId) -> Option<&StoredMessage> {
        self.messages.get(&id)
    }

    /// Oldest loaded id, the cursor for the next older page.
    pub fn oldest_id(&self) -> Option<MessageId> {
        self.messages.keys().next().copied()
    }

    /// Newest loaded id.
    pub fn newest_id(&self) -> Option<MessageId> {
        self.messages.keys().next_back().copied()
    }

    /// False once a page came back shorter than the page size.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// History request in flight, if any.
    pub fn loading(&self) -> Option<PageKind> {
        self.loading
    }

    /// Reply targets entries are currently waiting for.
    pub fn pending_targets(&self) -> Vec<MessageId> {
        let mut targets: Vec<_> = self
            .messages
            .values()
            .filter(|entry| entry.reply.is_pending())
            .filter_map(|entry| entry.message.reply_to)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Start a history request.
    ///
    /// Returns the query to issue, or `None` when no room is active, another
    /// request is in flight, or (for [`PageKind::Older`]) there is nothing
    /// older to load. A catch-up that finds a request in flight is queued and
    /// handed out by [`Self::take_queued_catch_up`] afterwards.
    pub fn begin_load(&mut self, kind: PageKind) -> Option<HistoryQuery> {
        let room_id = self.room_id?;

        if self.loading.is_some() {
            if kind == PageKind::CatchUp {
                self.catch_up_queued = true;
            }
            return None;
        }

        let last_msg_id = match kind {
            PageKind::Initial | PageKind::CatchUp => None,
            PageKind::Older => {
                if !self.initial_loaded || !self.has_more {
                    return None;
                }
                Some(self.oldest_id()?)
            },
        };

        self.loading = Some(kind);
        Some(HistoryQuery { room_id, last_msg_id, page_size: self.page_size })
    }

    /// The in-flight history request failed.
    pub fn load_failed(&mut self) {
        self.loading = None;
    }

    /// Catch-up deferred while another request was in flight.
    pub fn take_queued_catch_up(&mut self) -> bool {
        if self.loading.is_some() {
            return false;
        }
        std::mem::take(&mut self.catch_up_queued)
    }

    /// Merge a history page in which every returned entry decoded.
    pub fn ingest_history_page(&mut self, kind: PageKind, messages: Vec<Message>) -> Ingest {
        let returned = messages.len();
        self.ingest_history(kind, returned, messages)
    }

    /// Merge a history page the backend returned `returned` entries for.
    ///
    /// `messages` may be shorter when malformed entries were dropped; the page
    /// size check uses `returned`. Initial and older pages shorter than the
    /// page size mean there is no more history. A catch-up page leaves that
    /// flag alone.
    pub fn ingest_history(
        &mut self,
        kind: PageKind,
        returned: usize,
        messages: Vec<Message>,
    ) -> Ingest {
        if self.loading == Some(kind) {
            self.loading = None;
        }

        let count = returned.max(messages.len());
        match kind {
            PageKind::Initial => {
                self.initial_loaded = true;
                self.has_more = count >= self.page_size;
            },
            PageKind::Older => self.has_more = count >= self.page_size,
            PageKind::CatchUp => {
                if !self.initial_loaded {
                    self.initial_loaded = true;
                    self.has_more = count >= self.page_size;
                }
            },
        }

        let ingest = self.merge(messages);
        debug!(
            ?kind,
            received = count,
            inserted = ingest.inserted.len(),
            has_more = self.has_more,
            "history page merged"
        );
        ingest
    }

    /// Merge one live message and decide how the view reacts.
    ///
    /// The viewport is measured before insertion. A duplicate yields
    /// [`ScrollHint::None`].
    pub fn ingest_live(&mut self, message: Message, viewport: Viewport) -> (Ingest, ScrollHint) {
        let ingest = self.merge(vec![message]);

        let hint = if ingest.inserted.is_empty() {
            ScrollHint::None
        } else if viewport.is_near_bottom() {
            ScrollHint::ScrollToBottom
        } else {
            ScrollHint::NewMessageIndicator
        };

        (ingest, hint)
    }

    /// Apply a batch lookup response.
    ///
    /// Targets in `found` are attached to every entry waiting for them. Ids in
    /// `requested` that `found` lacks mark their waiters unavailable. Applying
    /// the same response twice leaves the store unchanged.
    pub fn apply_resolution(&mut self, requested: &[MessageId], found: Vec<Message>) -> Resolution {
        let mut outcome = Resolution::default();
        let mut answered = BTreeSet::new();

        for target in found {
            if !requested.contains(&target.id) {
                warn!(id = target.id, "lookup returned unrequested message");
                continue;
            }
            answered.insert(target.id);
            outcome.resolved += self.attach(&target);
            self.unavailable.remove(&target.id);
            self.fetched.entry(target.id).or_insert(target);
        }

        for &id in requested {
            if answered.contains(&id) || self.lookup_target(id).is_some() {
                continue;
            }
            self.unavailable.insert(id);
            let Some(waiters) = self.waiting.get(&id) else { continue };
            for waiter in waiters {
                if let Some(entry) = self.messages.get_mut(waiter)
                    && entry.reply.is_pending()
                {
                    entry.reply = ReplyState::Unavailable;
                    outcome.unavailable += 1;
                }
            }
        }

        outcome
    }

    /// Mark every waiter of `ids` unavailable after a failed lookup.
    pub fn resolution_failed(&mut self, ids: &[MessageId]) -> usize {
        self.apply_resolution(ids, Vec::new()).unavailable
    }

    fn merge(&mut self, messages: Vec<Message>) -> Ingest {
        let mut ingest = Ingest::default();
        let mut targets = BTreeSet::new();

        let Some(room_id) = self.room_id else {
            ingest.rejected = messages.len();
            return ingest;
        };

        for message in messages {
            if message.room_id != room_id {
                warn!(
                    expected = room_id,
                    got = message.room_id,
                    id = message.id,
                    "dropping message for another room"
                );
                ingest.rejected += 1;
                continue;
            }
            if self.messages.contains_key(&message.id) {
                continue;
            }

            let id = message.id;
            let reply = match message.reply_to {
                None => ReplyState::None,
                Some(target) => {
                    if let Some(found) = self.lookup_target(target) {
                        ingest.resolved_locally += 1;
                        ReplyState::Resolved(Box::new(found.clone()))
                    } else {
                        self.waiting.entry(target).or_default().insert(id);
                        if self.unavailable.contains(&target) {
                            ReplyState::Unavailable
                        } else {
                            targets.insert(target);
                            ReplyState::Pending
                        }
                    }
                },
            };

            let arrived = self.waiting.contains_key(&id).then(|| message.clone());
            self.messages.insert(id, StoredMessage { message, reply });
            ingest.inserted.push(id);

            if let Some(arrived) = arrived {
                ingest.resolved_locally += self.attach(&arrived);
            }
        }

        ingest.inserted.sort_unstable();
        ingest.missing_replies =
            targets.into_iter().filter(|target| !self.messages.contains_key(target)).collect();
        ingest
    }

    fn lookup_target(&self, target: MessageId) -> Option<&Message> {
        self.messages
            .get(&target)
            .map(|entry| &entry.message)
            .or_else(|| self.fetched.get(&target))
    }

    /// Attach `target` to everything waiting for it. Returns entries changed.
    fn attach(&mut self, target: &Message) -> usize {
        let Some(waiters) = self.waiting.remove(&target.id) else {
            return 0;
        };

        let mut attached = 0;
        for waiter in waiters {
            if let Some(entry) = self.messages.get_mut(&waiter)
                && entry.reply.target().is_none()
            {
                entry.reply = ReplyState::Resolved(Box::new(target.clone()));
                attached += 1;
            }
        }
        attached
    }
}
