//! Sink - the consumer contract
//!
//! Anything with `push` and `close` can be connected to a source,
//! including another source.

use std::fmt;
use std::sync::Arc;

use crate::SourceResult;

/// Connection-set identity of a sink
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(usize);

impl SinkId {
    /// Identity derived from the address of a value
    #[inline]
    pub fn of<S: ?Sized>(sink: &S) -> Self {
        SinkId(sink as *const S as *const () as usize)
    }
}

impl fmt::Debug for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sink({:#x})", self.0)
    }
}

/// Receiver of values and of the terminal close signal.
///
/// Both operations run synchronously inside the caller's `push`/`close`.
/// Returning an error aborts the forwarding walk of the upstream source:
/// sinks after this one miss that delivery and the error reaches whoever
/// pushed.
pub trait Sink<T>: Send + Sync {
    /// Accept one value
    fn push(&self, value: T) -> SourceResult<()>;

    /// Upstream has terminated
    fn close(&self) -> SourceResult<()>;

    /// Identity used to keep the connection set unique.
    ///
    /// Defaults to the sink's address. Handle types whose clones share one
    /// underlying state should return the identity of that state.
    fn sink_id(&self) -> SinkId {
        SinkId::of(self)
    }
}

impl<T, S: Sink<T> + ?Sized> Sink<T> for Arc<S> {
    fn push(&self, value: T) -> SourceResult<()> {
        (**self).push(value)
    }

    fn close(&self) -> SourceResult<()> {
        (**self).close()
    }

    fn sink_id(&self) -> SinkId {
        (**self).sink_id()
    }
}

/// Sink built from a pair of closures
pub struct FnSink<P, C> {
    on_push: P,
    on_close: C,
}

impl<P, C> FnSink<P, C> {
    pub fn new(on_push: P, on_close: C) -> Self {
        Self { on_push, on_close }
    }
}

impl<P> FnSink<P, fn() -> SourceResult<()>> {
    /// Sink that ignores close
    pub fn on_push<T>(on_push: P) -> Self
    where
        P: Fn(T) -> SourceResult<()> + Send + Sync,
    {
        Self {
            on_push,
            on_close: || Ok(()),
        }
    }
}

impl<T, P, C> Sink<T> for FnSink<P, C>
where
    P: Fn(T) -> SourceResult<()> + Send + Sync,
    C: Fn() -> SourceResult<()> + Send + Sync,
{
    fn push(&self, value: T) -> SourceResult<()> {
        (self.on_push)(value)
    }

    fn close(&self) -> SourceResult<()> {
        (self.on_close)()
    }
}

impl<P, C> fmt::Debug for FnSink<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

/// Build a sink from a push closure and a close closure
pub fn sink_fn<T, P, C>(on_push: P, on_close: C) -> FnSink<P, C>
where
    P: Fn(T) -> SourceResult<()> + Send + Sync,
    C: Fn() -> SourceResult<()> + Send + Sync,
{
    FnSink::new(on_push, on_close)
}
