//! Fuzzing infrastructure for Rill sources
//!
//! Turns raw fuzzer input into a source configuration plus an operation
//! sequence, then replays it through [`rill_test::Scenario`], which checks
//! the source against its reference model after every step.

use arbitrary::Arbitrary;
use rill_core::{BufferSize, SourceOptions};
use rill_test::{Divergence, Op, Scenario};

/// Upper bound on operations per input
pub const MAX_OPS: usize = 256;

/// Fuzzer-chosen history limit
#[derive(Arbitrary, Debug, Clone, Copy)]
pub enum FuzzBuffer {
    Unbounded,
    Bounded(u8),
}

impl From<FuzzBuffer> for BufferSize {
    fn from(buffer: FuzzBuffer) -> Self {
        match buffer {
            FuzzBuffer::Unbounded => BufferSize::Unbounded,
            FuzzBuffer::Bounded(n) => BufferSize::Bounded(n as usize),
        }
    }
}

/// Fuzzer-chosen operation
#[derive(Arbitrary, Debug, Clone, Copy)]
pub enum FuzzOp {
    Push(u8),
    Close,
    Connect,
    Disconnect(u8),
}

impl From<FuzzOp> for Op {
    fn from(op: FuzzOp) -> Self {
        match op {
            FuzzOp::Push(v) => Op::Push(v),
            FuzzOp::Close => Op::Close,
            FuzzOp::Connect => Op::Connect,
            FuzzOp::Disconnect(n) => Op::Disconnect(n as usize),
        }
    }
}

/// One fuzz case
#[derive(Arbitrary, Debug, Clone)]
pub struct FuzzScenario {
    pub buffer: FuzzBuffer,
    pub use_common_stream: bool,
    pub ops: Vec<FuzzOp>,
}

impl FuzzScenario {
    pub fn options(&self) -> SourceOptions {
        SourceOptions::new()
            .with_buffer(self.buffer.into())
            .with_common_stream(self.use_common_stream)
    }

    /// Operations, truncated to [`MAX_OPS`]
    pub fn ops(&self) -> Vec<Op> {
        self.ops.iter().take(MAX_OPS).map(|&op| op.into()).collect()
    }

    /// Run against the reference model
    pub fn run(&self) -> Result<(), Divergence> {
        Scenario::run(self.options(), &self.ops()).map(|_| ())
    }
}
