/// Bounded FIFO containers backing the live snapshot history and the
/// discrete event feed
///
/// Consumers (chart renderers) scan the full contents on every redraw, so
/// nothing beyond linear iteration is offered.
use std::collections::VecDeque;

/// Fixed-capacity FIFO sequence with a "latest" accessor.
///
/// Capacity is set at construction and never changes; on overflow the
/// oldest entry is evicted. Insertion order is arrival order.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// Create an empty history holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Add `item` to the tail, evicting the head if at capacity.
    pub fn append(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Discard current contents and install `items`, keeping only the
    /// newest `capacity` entries (truncated from the front, order kept).
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items.clear();
        let skip = items.len().saturating_sub(self.capacity);
        self.items.extend(items.into_iter().skip(skip));
    }

    /// Most recently appended item, or `None` when empty.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Clear to empty; capacity is retained.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-to-newest iteration for full-scan renderers.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

/// Bounded log of discrete events kept newest-first for display.
#[derive(Debug, Clone)]
pub struct EventLog<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> EventLog<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event log capacity must be non-zero");
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Prepend `item`, truncating the tail past capacity.
    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        while self.items.len() > self.capacity {
            self.items.pop_back();
        }
    }

    /// Newest-to-oldest iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn reset(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
