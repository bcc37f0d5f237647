//! Page-local memory of already-counted content.
//!
//! Insertion-ordered rather than LRU: a hit does not refresh an entry, so the
//! oldest *reported* identifier is always the first to go.

use std::collections::{HashSet, VecDeque};

/// Default number of identifiers remembered per page.
pub const DEFAULT_CAPACITY: usize = 150;

/// Bounded set of content identifiers, evicted oldest-first.
#[derive(Debug, Clone)]
pub struct SeenSet {
    capacity: usize,
    entries: HashSet<String>,
    order: VecDeque<String>,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SeenSet {
    /// Create a new set with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashSet::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Record an identifier. Returns the evicted identifier, if any.
    ///
    /// Re-inserting a present identifier is a no-op and keeps its position.
    pub fn insert(&mut self, id: &str) -> Option<String> {
        if self.entries.contains(id) {
            return None;
        }
        self.entries.insert(id.to_string());
        self.order.push_back(id.to_string());

        if self.order.len() > self.capacity {
            let oldest = self.order.pop_front()?;
            self.entries.remove(&oldest);
            return Some(oldest);
        }
        None
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
