//! Source - push-based event node
//!
//! A source accepts values through `push`, records them in its replay
//! history (unless it runs a shared stream) and forwards them to every
//! connected sink before `push` returns.
//!
//! # Lifecycle
//!
//! ```text
//! Open --close--> Closed
//! ```
//!
//! - Open: `push` records and forwards, `connect` registers and replays
//! - Closed: `push` is dropped silently, `connect` still registers and
//!   replays the history including the close marker
//!
//! # Locking
//!
//! The state lock is held only to update history and to snapshot the
//! connection set. Sinks always run without it, so a sink may connect,
//! disconnect or push into other sources while being called.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{BufferSize, Event, EventLog, Sink, SinkId, SourceOptions, SourceResult};

/// Callback invoked once with a freshly built source, typically to seed it
pub type SourceGenerator<T> = Box<dyn FnOnce(&Source<T>) -> SourceResult<()>>;

type SharedSink<T> = Arc<dyn Sink<T>>;

/// One registry entry. `token` is unique per source and never reused.
struct Registration<T> {
    token: u64,
    id: SinkId,
    sink: SharedSink<T>,
}

struct SourceState<T> {
    options: SourceOptions,
    /// Replay history, absent for shared streams
    log: Option<EventLog<T>>,
    /// Connected sinks, unique by identity
    connections: Vec<Registration<T>>,
    next_token: u64,
    closed: bool,
}

impl<T> SourceState<T> {
    fn new(options: SourceOptions) -> Self {
        let log = if options.use_common_stream {
            None
        } else {
            Some(EventLog::new(options.buffer_size))
        };

        Self {
            options,
            log,
            connections: Vec::new(),
            next_token: 0,
            closed: false,
        }
    }

    /// Add a sink unless one with the same identity is present.
    ///
    /// Returns the token of the entry holding the sink and whether it was
    /// newly added.
    fn register(&mut self, id: SinkId, sink: SharedSink<T>) -> (u64, bool) {
        if let Some(existing) = self.connections.iter().find(|r| r.id == id) {
            return (existing.token, false);
        }
        let token = self.next_token;
        self.next_token += 1;
        self.connections.push(Registration { token, id, sink });
        (token, true)
    }

    fn deregister(&mut self, token: u64) -> bool {
        let before = self.connections.len();
        self.connections.retain(|r| r.token != token);
        self.connections.len() != before
    }

    fn is_registered(&self, token: u64) -> bool {
        self.connections.iter().any(|r| r.token == token)
    }

    /// Sinks to deliver the current call to
    fn targets(&self) -> Vec<SharedSink<T>> {
        self.connections.iter().map(|r| r.sink.clone()).collect()
    }
}

/// Push-based event source.
///
/// `Source` is a handle: clones refer to the same node, share history and
/// connections, and have the same [`SinkId`].
pub struct Source<T> {
    state: Arc<Mutex<SourceState<T>>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for Source<T> {
    fn default() -> Self {
        Self::new(SourceOptions::DEFAULT)
    }
}

impl<T> Source<T> {
    /// Create an open source with no connections
    pub fn new(options: SourceOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState::new(options))),
        }
    }

    /// Create a source and run `generator` on it before returning.
    ///
    /// An error from the generator is returned instead of the source.
    pub fn with_generator<G>(options: SourceOptions, generator: G) -> SourceResult<Self>
    where
        G: FnOnce(&Source<T>) -> SourceResult<()>,
    {
        let source = Self::new(options);
        generator(&source)?;
        Ok(source)
    }

    /// Create a source, running the generator if one is given
    pub fn from_generator(
        generator: Option<SourceGenerator<T>>,
        options: SourceOptions,
    ) -> SourceResult<Self> {
        match generator {
            Some(generator) => Self::with_generator(options, generator),
            None => Ok(Self::new(options)),
        }
    }

    pub fn options(&self) -> SourceOptions {
        self.state.lock().options
    }

    pub fn buffer_size(&self) -> BufferSize {
        self.options().buffer_size
    }

    /// Does this source run a single shared live stream without history?
    pub fn is_shared(&self) -> bool {
        self.options().use_common_stream
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of retained history entries, close marker included
    pub fn history_len(&self) -> usize {
        self.state.lock().log.as_ref().map_or(0, EventLog::len)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Identity of this source when used as a sink
    pub fn id(&self) -> SinkId {
        SinkId::of(&*self.state)
    }
}

impl<T: Clone + 'static> Source<T> {
    /// Retained history, oldest first. Empty for shared streams.
    pub fn history(&self) -> Vec<Event<T>> {
        self.state
            .lock()
            .log
            .as_ref()
            .map(EventLog::snapshot)
            .unwrap_or_default()
    }

    /// Record `value` and forward it to every connected sink.
    ///
    /// Dropped without effect once the source is closed. The first sink
    /// error stops the walk and is returned.
    pub fn push(&self, value: T) -> SourceResult<()> {
        let targets = {
            let mut state = self.state.lock();
            if state.closed {
                trace!("source closed, dropping pushed value");
                return Ok(());
            }
            if let Some(log) = state.log.as_mut() {
                log.record(value.clone());
            }
            state.targets()
        };

        trace!(sinks = targets.len(), "forwarding value");
        fan_out(&targets, |sink| sink.push(value.clone()))
    }

    /// Close the source and forward close to every connected sink.
    ///
    /// The source is marked closed and the close marker recorded before any
    /// sink is notified, so a push arriving during the forwarding is dropped
    /// and a sink failing on close still leaves the source closed.
    ///
    /// Not guarded: every call appends another close marker and notifies
    /// the sinks again.
    pub fn close(&self) -> SourceResult<()> {
        let targets = {
            let mut state = self.state.lock();
            if let Some(log) = state.log.as_mut() {
                log.record_close();
            }
            if state.closed {
                debug!("closing an already closed source");
            }
            state.closed = true;
            state.targets()
        };

        debug!(sinks = targets.len(), "source closed");
        fan_out(&targets, |sink| sink.close())
    }

    /// Connect `sink` and replay the retained history into it.
    ///
    /// Connecting a sink that is already connected leaves the connection
    /// set unchanged but replays again. The sink is registered before the
    /// replay runs; if the replay fails it stays connected and the error is
    /// returned.
    pub fn connect<S>(&self, sink: S) -> SourceResult<Connection<T>>
    where
        S: Sink<T> + 'static,
    {
        let sink: SharedSink<T> = Arc::new(sink);
        let id = sink.sink_id();

        let (token, history) = {
            let mut state = self.state.lock();
            let (token, added) = state.register(id, sink.clone());
            debug!(
                sink = ?id,
                added,
                connections = state.connections.len(),
                "sink connected"
            );
            let history = state.log.as_ref().map(EventLog::snapshot).unwrap_or_default();
            (token, history)
        };

        if let Err(err) = replay(sink.as_ref(), history) {
            warn!(sink = ?id, error = %err, "replay failed");
            return Err(err);
        }

        Ok(Connection {
            state: Arc::downgrade(&self.state),
            sink: id,
            token,
        })
    }

    /// Connect another source downstream of this one
    pub fn pipe(&self, target: &Source<T>) -> SourceResult<Connection<T>>
    where
        T: Send,
    {
        self.connect(target.clone())
    }
}

impl<T: Clone + Send + 'static> Sink<T> for Source<T> {
    fn push(&self, value: T) -> SourceResult<()> {
        Source::push(self, value)
    }

    fn close(&self) -> SourceResult<()> {
        Source::close(self)
    }

    fn sink_id(&self) -> SinkId {
        self.id()
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Source")
            .field("options", &state.options)
            .field("closed", &state.closed)
            .field("history", &state.log.as_ref().map_or(0, EventLog::len))
            .field("connections", &state.connections.len())
            .finish()
    }
}

/// Deliver to each target in order, stopping at the first failure
fn fan_out<T, F>(targets: &[SharedSink<T>], mut deliver: F) -> SourceResult<()>
where
    F: FnMut(&dyn Sink<T>) -> SourceResult<()>,
{
    for (index, sink) in targets.iter().enumerate() {
        if let Err(err) = deliver(sink.as_ref()) {
            warn!(
                sink = ?sink.sink_id(),
                skipped = targets.len() - index - 1,
                error = %err,
                "sink failed, delivery aborted"
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Replay history into a single sink. Stops at the close marker.
fn replay<T>(sink: &dyn Sink<T>, history: Vec<Event<T>>) -> SourceResult<()> {
    if !history.is_empty() {
        trace!(events = history.len(), "replaying history");
    }

    for event in history {
        match event {
            Event::Value(value) => sink.push(value)?,
            Event::Close => {
                sink.close()?;
                break;
            }
        }
    }
    Ok(())
}

/// Handle for one `connect` call
pub struct Connection<T> {
    state: Weak<Mutex<SourceState<T>>>,
    sink: SinkId,
    /// Registry entry this handle removes. Sink addresses can be reused
    /// after a disconnect, tokens cannot.
    token: u64,
}

impl<T> Connection<T> {
    /// Remove the sink from the source. Further calls do nothing.
    pub fn disconnect(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };

        if state.lock().deregister(self.token) {
            debug!(sink = ?self.sink, "sink disconnected");
        }
    }

    /// Is the sink still registered with a live source?
    pub fn is_connected(&self) -> bool {
        self.state
            .upgrade()
            .map_or(false, |state| state.lock().is_registered(self.token))
    }

    pub fn sink_id(&self) -> SinkId {
        self.sink
    }
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("sink", &self.sink)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceError;
    use proptest::prelude::*;

    /// Sink that records what it receives as events
    #[derive(Clone, Default)]
    struct Tape<T> {
        events: Arc<Mutex<Vec<Event<T>>>>,
    }

    impl<T: Clone> Tape<T> {
        fn events(&self) -> Vec<Event<T>> {
            self.events.lock().clone()
        }
    }

    impl<T: Send> Sink<T> for Tape<T> {
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

    fn values<T: Clone>(values: &[T]) -> Vec<Event<T>> {
        values.iter().cloned().map(Event::Value).collect()
    }

    #[test]
    fn test_push_forwards_to_sink() {
        let source = Source::default();
        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();

        source.push(1).unwrap();
        source.push(2).unwrap();

        assert_eq!(tape.events(), values(&[1, 2]));
        assert_eq!(source.history_len(), 2);
    }

    #[test]
    fn test_replay_on_connect() {
        let source = Source::default();
        for v in ["a", "b", "c"] {
            source.push(v).unwrap();
        }

        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();
        source.push("d").unwrap();

        assert_eq!(tape.events(), values(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_push_after_close_dropped() {
        let source = Source::default();
        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();

        source.close().unwrap();
        let len = source.history_len();
        source.push(7).unwrap();

        assert!(source.is_closed());
        assert_eq!(source.history_len(), len);
        assert_eq!(tape.events(), vec![Event::Close]);
    }

    #[test]
    fn test_connect_after_close_replays_close() {
        let source = Source::default();
        source.push(1).unwrap();
        source.close().unwrap();

        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();
        source.push(2).unwrap();

        assert_eq!(tape.events(), vec![Event::Value(1), Event::Close]);
    }

    #[test]
    fn test_double_close_not_guarded() {
        let source: Source<u8> = Source::default();
        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();

        source.close().unwrap();
        source.close().unwrap();

        assert_eq!(source.history(), vec![Event::Close, Event::Close]);
        assert_eq!(tape.events(), vec![Event::Close, Event::Close]);

        // Replay stops at the first marker
        let late = Tape::default();
        source.connect(late.clone()).unwrap();
        assert_eq!(late.events(), vec![Event::Close]);
    }

    #[test]
    fn test_shared_stream_has_no_replay() {
        let source = Source::new(SourceOptions::shared());
        source.push(1).unwrap();

        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();
        source.push(2).unwrap();
        source.close().unwrap();

        assert_eq!(tape.events(), vec![Event::Value(2), Event::Close]);
        assert_eq!(source.history_len(), 0);
        assert!(source.history().is_empty());

        let late = Tape::<i32>::default();
        source.connect(late.clone()).unwrap();
        assert!(late.events().is_empty());
    }

    #[test]
    fn test_bounded_history_eviction() {
        let source = Source::new(SourceOptions::new().with_buffer_size(3));
        for v in 0..5 {
            source.push(v).unwrap();
        }
        assert_eq!(source.history_len(), 0);

        let source = Source::new(SourceOptions::new().with_buffer_size(1));
        for v in 0..5 {
            source.push(v).unwrap();
        }
        assert_eq!(source.history(), values(&[0, 1, 2, 3, 4]));
    }

    #[test]
    fn test_duplicate_connect_replays_again() {
        let source = Source::default();
        source.push(1).unwrap();

        let tape = Tape::default();
        source.connect(tape.clone()).unwrap();
        source.connect(tape.clone()).unwrap();
        assert_eq!(source.connection_count(), 1);

        source.push(2).unwrap();
        assert_eq!(tape.events(), values(&[1, 1, 2]));
    }

    #[test]
    fn test_disconnect_idempotent() {
        let source = Source::default();
        let tape = Tape::default();
        let connection = source.connect(tape.clone()).unwrap();
        assert!(connection.is_connected());

        connection.disconnect();
        connection.disconnect();
        source.push(1).unwrap();

        assert!(!connection.is_connected());
        assert_eq!(source.connection_count(), 0);
        assert!(tape.events().is_empty());
    }

    #[test]
    fn test_stale_disconnect_leaves_new_sink() {
        let source = Source::<u8>::default();

        let first = source.connect(Tape::default()).unwrap();
        first.disconnect();

        let tape = Tape::default();
        let second = source.connect(tape.clone()).unwrap();
        first.disconnect();
        source.push(1).unwrap();

        assert!(!first.is_connected());
        assert!(second.is_connected());
        assert_eq!(tape.events(), values(&[1]));
    }

    #[test]
    fn test_stale_disconnect_after_reconnecting_same_sink() {
        let source = Source::<u8>::default();
        let tape = Tape::default();

        let first = source.connect(tape.clone()).unwrap();
        first.disconnect();
        let second = source.connect(tape.clone()).unwrap();
        assert_eq!(first.sink_id(), second.sink_id());

        first.disconnect();
        source.push(1).unwrap();

        assert!(!first.is_connected());
        assert!(second.is_connected());
        assert_eq!(source.connection_count(), 1);
        assert_eq!(tape.events(), values(&[1]));
    }

    #[test]
    fn test_duplicate_connect_handles_share_entry() {
        let source = Source::<u8>::default();
        let tape = Tape::default();

        let first = source.connect(tape.clone()).unwrap();
        let second = source.connect(tape.clone()).unwrap();
        second.disconnect();

        assert!(!first.is_connected());
        assert_eq!(source.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_after_source_dropped() {
        let source = Source::<u8>::default();
        let connection = source.connect(Tape::default()).unwrap();
        drop(source);

        connection.disconnect();
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_pipe_chains_sources() {
        let a = Source::default();
        let b = Source::default();
        let tape = Tape::default();

        a.pipe(&b).unwrap();
        b.connect(tape.clone()).unwrap();
        a.push("x").unwrap();

        assert_eq!(tape.events(), values(&["x"]));
        assert_eq!(b.history(), values(&["x"]));
    }

    #[test]
    fn test_source_clones_share_identity() {
        let source = Source::<u8>::default();
        let target = Source::<u8>::default();

        source.pipe(&target).unwrap();
        source.connect(target.clone()).unwrap();

        assert_eq!(source.connection_count(), 1);
        assert_eq!(Sink::sink_id(&target), target.clone().id());
    }

    #[test]
    fn test_generator_seeds_source() {
        let source = Source::with_generator(SourceOptions::DEFAULT, |src| {
            src.push(10)?;
            src.push(20)
        })
        .unwrap();

        assert_eq!(source.history(), values(&[10, 20]));

        let none = Source::<u8>::from_generator(None, SourceOptions::shared()).unwrap();
        assert!(none.is_shared());
    }

    #[test]
    fn test_generator_error_propagates() {
        let generator: SourceGenerator<u8> =
            Box::new(|_| Err(SourceError::rejected("generator refused")));

        let result = Source::from_generator(Some(generator), SourceOptions::DEFAULT);
        assert!(matches!(result, Err(SourceError::SinkRejected(_))));
    }

    #[test]
    fn test_failing_sink_stops_fan_out() {
        let source = Source::<u8>::default();
        let first = Tape::default();
        let last = Tape::default();

        source.connect(first.clone()).unwrap();
        source
            .connect(crate::FnSink::on_push(|_: u8| Err(SourceError::rejected("full"))))
            .unwrap();
        source.connect(last.clone()).unwrap();

        let err = source.push(1).unwrap_err();
        assert!(matches!(err, SourceError::SinkRejected(_)));
        assert_eq!(first.events(), values(&[1]));
        assert!(last.events().is_empty());
        // Recorded before forwarding
        assert_eq!(source.history_len(), 1);
    }

    #[test]
    fn test_failed_replay_keeps_registration() {
        let source = Source::default();
        source.push(1u8).unwrap();

        let result = source.connect(crate::FnSink::on_push(|_: u8| Err(SourceError::rejected("no"))));
        assert!(result.is_err());
        assert_eq!(source.connection_count(), 1);
    }

    #[test]
    fn test_sink_may_disconnect_itself() {
        let source = Source::<u8>::default();
        let slot: Arc<Mutex<Option<Connection<u8>>>> = Arc::new(Mutex::new(None));
        let tape = Tape::default();

        let handle = {
            let slot = slot.clone();
            let tape = tape.clone();
            source
                .connect(crate::FnSink::on_push(move |v: u8| {
                    tape.push(v)?;
                    if let Some(connection) = slot.lock().as_ref() {
                        connection.disconnect();
                    }
                    Ok(())
                }))
                .unwrap()
        };
        *slot.lock() = Some(handle);

        source.push(1).unwrap();
        source.push(2).unwrap();

        assert_eq!(tape.events(), values(&[1]));
    }

    proptest! {
        #[test]
        fn prop_replay_matches_pushes(pushed in proptest::collection::vec(any::<u16>(), 0..64)) {
            let source = Source::default();
            for v in &pushed {
                source.push(*v).unwrap();
            }

            let tape = Tape::default();
            source.connect(tape.clone()).unwrap();
            prop_assert_eq!(tape.events(), values(&pushed));
        }

        #[test]
        fn prop_nothing_after_close(
            before in proptest::collection::vec(any::<u8>(), 0..16),
            after in proptest::collection::vec(any::<u8>(), 0..16),
        ) {
            let source = Source::default();
            let tape = Tape::default();
            source.connect(tape.clone()).unwrap();

            for v in &before {
                source.push(*v).unwrap();
            }
            source.close().unwrap();
            for v in &after {
                source.push(*v).unwrap();
            }

            let history = source.history();
            prop_assert_eq!(history.last(), Some(&Event::Close));
            prop_assert_eq!(history.len(), before.len() + 1);
            prop_assert_eq!(tape.events(), history);
        }
    }
}
