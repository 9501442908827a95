//! Replay history
//!
//! A source that keeps history records every accepted value and the
//! terminal close in an append-only log. The log is replayed, in
//! chronological order, to each sink that connects later.

use std::collections::VecDeque;

use crate::BufferSize;

/// One entry of the replay history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    /// A pushed value
    Value(T),
    /// The source was closed
    Close,
}

impl<T> Event<T> {
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Event::Close)
    }

    /// The carried value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Event::Value(v) => Some(v),
            Event::Close => None,
        }
    }
}

/// Append-only event log with front eviction
#[derive(Debug, Clone)]
pub struct EventLog<T> {
    entries: VecDeque<Event<T>>,
    buffer_size: BufferSize,
}

impl<T> EventLog<T> {
    pub fn new(buffer_size: BufferSize) -> Self {
        Self {
            entries: VecDeque::new(),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> BufferSize {
        self.buffer_size
    }

    /// Append a value, then evict the oldest entry while the log is still
    /// below a bounded capacity.
    ///
    /// The trigger is `len < n`, not `len > n`. For `Bounded(n)` with
    /// `n >= 2` the log therefore never retains a value, while `Bounded(0)`
    /// and `Bounded(1)` never evict.
    pub fn record(&mut self, value: T) {
        self.entries.push_back(Event::Value(value));

        if let BufferSize::Bounded(n) = self.buffer_size {
            if self.entries.len() < n {
                self.entries.pop_front();
                tracing::trace!(retained = self.entries.len(), capacity = n, "evicted oldest event");
            }
        }
    }

    /// Append the close marker. Eviction only runs on values.
    pub fn record_close(&mut self) {
        self.entries.push_back(Event::Close);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Has a close marker been recorded?
    pub fn is_terminated(&self) -> bool {
        self.entries.iter().any(Event::is_close)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event<T>> {
        self.entries.iter()
    }
}

impl<T: Clone> EventLog<T> {
    /// Owned copy of the history, oldest first
    pub fn snapshot(&self) -> Vec<Event<T>> {
        self.entries.iter().cloned().collect()
    }
}
