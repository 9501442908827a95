//! Faulty sinks for partial-failure testing
//!
//! A failing sink aborts the upstream fan-out; these sinks make that
//! failure happen at a chosen point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rill_core::{Event, Sink, SinkId, SourceError, SourceResult};

use crate::Recorder;

/// When a [`FaultySink`] fails
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Reject the n-th push (1-based), accept all others
    OnPush(usize),
    /// Reject every push
    EveryPush,
    /// Fail when closed
    OnClose,
}

/// Sink that records accepted deliveries and fails according to a [`Fault`]
#[derive(Debug)]
pub struct FaultySink<T> {
    fault: Fault,
    pushes: Arc<AtomicUsize>,
    accepted: Recorder<T>,
}

impl<T> Clone for FaultySink<T> {
    fn clone(&self) -> Self {
        Self {
            fault: self.fault,
            pushes: self.pushes.clone(),
            accepted: self.accepted.clone(),
        }
    }
}

impl<T: Clone> FaultySink<T> {
    pub fn new(fault: Fault) -> Self {
        Self {
            fault,
            pushes: Arc::new(AtomicUsize::new(0)),
            accepted: Recorder::new(),
        }
    }

    /// Push attempts seen, failed ones included
    pub fn attempts(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Deliveries that were accepted
    pub fn accepted(&self) -> Vec<Event<T>> {
        self.accepted.events()
    }
}

impl<T: Clone + Send> Sink<T> for FaultySink<T> {
    fn push(&self, value: T) -> SourceResult<()> {
        let attempt = self.pushes.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault {
            Fault::OnPush(n) if n == attempt => {
                Err(SourceError::rejected(format!("push #{attempt} rejected")))
            }
            Fault::EveryPush => Err(SourceError::rejected("sink rejects all values")),
            _ => self.accepted.push(value),
        }
    }

    fn close(&self) -> SourceResult<()> {
        if self.fault == Fault::OnClose {
            return Err(SourceError::close_failed("sink refuses to close"));
        }
        Sink::<T>::close(&self.accepted)
    }

    fn sink_id(&self) -> SinkId {
        SinkId::of(&*self.pushes)
    }
}
