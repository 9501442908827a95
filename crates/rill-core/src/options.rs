//! Source configuration
//!
//! Two knobs, both fixed at construction:
//! - `buffer_size`: cap on retained replay history
//! - `use_common_stream`: share one live stream between all sinks and keep
//!   no history at all

use serde::{Deserialize, Serialize};

use crate::SourceResult;

/// Retained history limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSize {
    /// History is never evicted
    #[default]
    Unbounded,
    /// History is subject to the eviction rule of [`crate::EventLog::record`]
    Bounded(usize),
}

impl BufferSize {
    #[inline]
    pub fn is_bounded(self) -> bool {
        matches!(self, BufferSize::Bounded(_))
    }

    /// The numeric limit, `None` when unbounded
    #[inline]
    pub fn limit(self) -> Option<usize> {
        match self {
            BufferSize::Unbounded => None,
            BufferSize::Bounded(n) => Some(n),
        }
    }
}

impl From<usize> for BufferSize {
    fn from(n: usize) -> Self {
        BufferSize::Bounded(n)
    }
}

impl From<Option<usize>> for BufferSize {
    fn from(n: Option<usize>) -> Self {
        n.map_or(BufferSize::Unbounded, BufferSize::Bounded)
    }
}

/// Source construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Replay history cap
    pub buffer_size: BufferSize,
    /// true - all sinks listen to one common live stream, nothing is replayed
    /// false - each sink gets the retained history replayed on connect
    pub use_common_stream: bool,
}

impl SourceOptions {
    /// Unbounded history, per-consumer replay
    pub const DEFAULT: SourceOptions = SourceOptions {
        buffer_size: BufferSize::Unbounded,
        use_common_stream: false,
    };

    pub fn new() -> Self {
        Self::DEFAULT
    }

    /// Options for a shared live stream
    pub fn shared() -> Self {
        Self::DEFAULT.with_common_stream(true)
    }

    /// Bound the replay history to `n` entries
    pub fn with_buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = BufferSize::Bounded(n);
        self
    }

    pub fn with_buffer(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_common_stream(mut self, use_common_stream: bool) -> Self {
        self.use_common_stream = use_common_stream;
        self
    }

    /// Parse options from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> SourceResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
