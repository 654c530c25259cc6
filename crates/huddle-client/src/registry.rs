//! Room link cache.
//!
//! One live link per room, shared by every view that shows the room. Views
//! come and go without tearing links down. Links are dropped only when the
//! user leaves all chat contexts for a room or logs out.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use huddle_core::LinkState;
use huddle_proto::RoomId;
use tracing::debug;

/// A room's real-time link as seen by the registry.
pub trait LinkHandle: Send + Sync {
    /// Room the link serves.
    fn room_id(&self) -> RoomId;

    /// Current state, readable from any thread.
    fn state(&self) -> LinkState;

    /// Tear the link down. Idempotent.
    fn close(&self);
}

/// Room id to link cache.
///
/// Constructed once at startup and passed to whoever needs links.
pub struct ConnectionRegistry<H: LinkHandle> {
    links: Mutex<HashMap<RoomId, Arc<H>>>,
}

impl<H: LinkHandle> ConnectionRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { links: Mutex::new(HashMap::new()) }
    }

    /// Link for the room, created with `create` unless a live one is cached.
    ///
    /// A cached link that is connected or still connecting is reused. Any
    /// other cached link is closed and replaced. `create` runs under the
    /// registry lock, so concurrent callers never create two links for one
    /// room. It must not block.
    pub fn acquire<F, Err>(&self, room_id: RoomId, create: F) -> Result<Arc<H>, Err>
    where
        F: FnOnce() -> Result<H, Err>,
    {
        let mut links = self.lock();

        if let Some(existing) = links.get(&room_id) {
            let state = existing.state();
            if state.is_live() {
                return Ok(Arc::clone(existing));
            }
            debug!(room_id, %state, "replacing stale link");
            existing.close();
        }

        let link = Arc::new(create()?);
        links.insert(room_id, Arc::clone(&link));
        Ok(link)
    }

    /// Cached link for the room, live or not.
    pub fn get(&self, room_id: RoomId) -> Option<Arc<H>> {
        self.lock().get(&room_id).cloned()
    }

    /// Close and forget the room's link.
    pub fn invalidate(&self, room_id: RoomId) -> bool {
        let removed = self.lock().remove(&room_id);
        if let Some(link) = &removed {
            link.close();
        }
        removed.is_some()
    }

    /// Close and forget every link. Returns how many were dropped.
    pub fn invalidate_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().map(|(_, link)| link).collect();
        for link in &drained {
            link.close();
        }
        drained.len()
    }

    /// Number of cached links.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Rooms with a cached link, ascending.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<_> = self.lock().keys().copied().collect();
        rooms.sort_unstable();
        rooms
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, Arc<H>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: LinkHandle> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    struct FakeLink {
        room_id: RoomId,
        state: AtomicU8,
        closed: AtomicBool,
    }

    impl FakeLink {
        fn new(room_id: RoomId, state: LinkState) -> Self {
            Self { room_id, state: AtomicU8::new(state.to_u8()), closed: AtomicBool::new(false) }
        }

        fn set(&self, state: LinkState) {
            self.state.store(state.to_u8(), Ordering::SeqCst);
        }
    }

    impl LinkHandle for FakeLink {
        fn room_id(&self) -> RoomId {
            self.room_id
        }

        fn state(&self) -> LinkState {
            LinkState::from_u8(self.state.load(Ordering::SeqCst))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.set(LinkState::Disconnected);
        }
    }

    fn connecting(room_id: RoomId) -> Result<FakeLink, Infallible> {
        Ok(FakeLink::new(room_id, LinkState::Connecting))
    }

    #[test]
    fn live_link_is_reused() {
        let registry = ConnectionRegistry::new();

        let first = registry.acquire(1, || connecting(1)).unwrap();
        let second = registry.acquire(1, || connecting(1)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_link_is_replaced() {
        let registry = ConnectionRegistry::new();
        let first = registry.acquire(1, || connecting(1)).unwrap();
        first.set(LinkState::Reconnecting);

        let second = registry.acquire(1, || connecting(1)).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn failed_create_leaves_cache_untouched() {
        let registry: ConnectionRegistry<FakeLink> = ConnectionRegistry::new();
        let result = registry.acquire(1, || Err::<FakeLink, _>("refused"));

        assert_eq!(result.err(), Some("refused"));
        assert!(registry.is_empty());
    }

    #[test]
    fn invalidate_closes_links() {
        let registry = ConnectionRegistry::new();
        let a = registry.acquire(1, || connecting(1)).unwrap();
        let b = registry.acquire(2, || connecting(2)).unwrap();

        assert!(registry.invalidate(1));
        assert!(!registry.invalidate(1));
        assert!(a.closed.load(Ordering::SeqCst));
        assert_eq!(registry.rooms(), vec![2]);

        assert_eq!(registry.invalidate_all(), 1);
        assert!(b.closed.load(Ordering::SeqCst));
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn concurrent_acquire_creates_one_link() {
        let registry = Arc::new(ConnectionRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    registry
                        .acquire(7, || {
                            created.fetch_add(1, Ordering::SeqCst);
                            connecting(7)
                        })
                        .unwrap()
                })
            })
            .collect();

        let links: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(links.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
