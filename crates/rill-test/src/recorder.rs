//! Recording sink
//!
//! Captures every `push` and `close` it receives, in call order, as
//! history events so recordings compare directly against
//! [`Source::history`](rill_core::Source::history).

use std::sync::Arc;

use parking_lot::Mutex;
use rill_core::{Event, Sink, SinkId, SourceResult};

/// Sink that records deliveries.
///
/// Clones share the recording and the connection identity.
#[derive(Debug)]
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<Event<T>>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far
    pub fn events(&self) -> Vec<Event<T>> {
        self.events.lock().clone()
    }

    /// Pushed values only, in order
    pub fn values(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(Event::value)
            .cloned()
            .collect()
    }

    /// Number of close calls received
    pub fn close_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_close()).count()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// Total number of calls received
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<T: Send> Sink<T> for Recorder<T> {
    fn push(&self, value: T) -> SourceResult<()> {
        self.events.lock().push(Event::Value(value));
        Ok(())
    }

    fn close(&self) -> SourceResult<()> {
        self.events.lock().push(Event::Close);
        Ok(())
    }

    fn sink_id(&self) -> SinkId {
        SinkId::of(&*self.events)
    }
}
