//! Bounded set of already-seen `MarketCreated` deliveries.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::EventKey;

/// Insert-if-absent set of event keys with oldest-first eviction.
///
/// Shared by the webhook and the log poll so the same log delivered through
/// both paths is processed once.
pub struct EventDeduplicator {
    capacity: usize,
    seen: DashMap<EventKey, ()>,
    /// Insertion order. Every write to `seen` happens under this lock, so
    /// both always hold the same keys.
    order: Mutex<VecDeque<EventKey>>,
}

impl EventDeduplicator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    /// Record `key`. Returns `false` when it was already present.
    pub fn insert(&self, key: &EventKey) -> bool {
        let mut order = self.order.lock();
        if self.seen.insert(key.clone(), ()).is_some() {
            return false;
        }
        order.push_back(key.clone());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Drop `key` so a later delivery is processed again.
    pub fn forget(&self, key: &EventKey) {
        let mut order = self.order.lock();
        if self.seen.remove(key).is_some() {
            order.retain(|k| k != key);
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
