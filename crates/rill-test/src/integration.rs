//! End-to-end propagation suite
//!
//! Drives a real [`Source`] and a reference model with the same operation
//! sequence and compares history and per-sink recordings after every step.
//! Shared by the property tests below and by the fuzz targets.

use std::collections::VecDeque;
use std::fmt;

use rill_core::{BufferSize, Connection, Event, Source, SourceOptions, SourceResult};

use crate::Recorder;

// ============================================================================
// OPERATIONS
// ============================================================================

/// One step applied to the source under test
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Push(u8),
    Close,
    /// Connect a fresh recorder
    Connect,
    /// Disconnect the n-th recorder ever connected (wraps around)
    Disconnect(usize),
}

/// Model and real source disagree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub step: usize,
    pub op: Op,
    pub detail: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({:?}): {}", self.step, self.op, self.detail)
    }
}

impl std::error::Error for Divergence {}

// ============================================================================
// REFERENCE MODEL
// ============================================================================

#[derive(Debug)]
struct ModelSink {
    expected: Vec<Event<u8>>,
    connected: bool,
}

/// Straight-line description of what a source must do
#[derive(Debug)]
struct Model {
    options: SourceOptions,
    history: VecDeque<Event<u8>>,
    closed: bool,
    sinks: Vec<ModelSink>,
}

impl Model {
    fn new(options: SourceOptions) -> Self {
        Self {
            options,
            history: VecDeque::new(),
            closed: false,
            sinks: Vec::new(),
        }
    }

    fn live(&mut self) -> impl Iterator<Item = &mut ModelSink> {
        self.sinks.iter_mut().filter(|s| s.connected)
    }

    fn push(&mut self, value: u8) {
        if self.closed {
            return;
        }
        if !self.options.use_common_stream {
            self.history.push_back(Event::Value(value));
            if let BufferSize::Bounded(n) = self.options.buffer_size {
                if self.history.len() < n {
                    self.history.pop_front();
                }
            }
        }
        for sink in self.live() {
            sink.expected.push(Event::Value(value));
        }
    }

    fn close(&mut self) {
        if !self.options.use_common_stream {
            self.history.push_back(Event::Close);
        }
        self.closed = true;
        for sink in self.live() {
            sink.expected.push(Event::Close);
        }
    }

    fn connect(&mut self) {
        let mut expected = Vec::new();
        if !self.options.use_common_stream {
            for event in &self.history {
                expected.push(event.clone());
                if event.is_close() {
                    break;
                }
            }
        }
        self.sinks.push(ModelSink {
            expected,
            connected: true,
        });
    }

    fn disconnect(&mut self, index: usize) {
        self.sinks[index].connected = false;
    }
}

// ============================================================================
// SCENARIO
// ============================================================================

/// A source under test, its recorders and the model it must follow
pub struct Scenario {
    source: Source<u8>,
    sinks: Vec<(Recorder<u8>, Connection<u8>)>,
    model: Model,
    steps: usize,
}

impl Scenario {
    pub fn new(options: SourceOptions) -> Self {
        Self {
            source: Source::new(options),
            sinks: Vec::new(),
            model: Model::new(options),
            steps: 0,
        }
    }

    pub fn source(&self) -> &Source<u8> {
        &self.source
    }

    /// Recorders in connection order
    pub fn recorders(&self) -> impl Iterator<Item = &Recorder<u8>> {
        self.sinks.iter().map(|(recorder, _)| recorder)
    }

    /// Apply one operation to both sides
    pub fn apply(&mut self, op: Op) -> SourceResult<()> {
        self.steps += 1;
        match op {
            Op::Push(value) => {
                self.model.push(value);
                self.source.push(value)?;
            }
            Op::Close => {
                self.model.close();
                self.source.close()?;
            }
            Op::Connect => {
                self.model.connect();
                let recorder = Recorder::new();
                let connection = self.source.connect(recorder.clone())?;
                self.sinks.push((recorder, connection));
            }
            Op::Disconnect(n) => {
                if !self.sinks.is_empty() {
                    let index = n % self.sinks.len();
                    self.model.disconnect(index);
                    self.sinks[index].1.disconnect();
                }
            }
        }
        Ok(())
    }

    /// Compare the real source against the model
    pub fn check(&self, op: Op) -> Result<(), Divergence> {
        let diverged = |detail: String| Divergence {
            step: self.steps,
            op,
            detail,
        };

        let history = self.source.history();
        let expected: Vec<_> = self.model.history.iter().cloned().collect();
        if history != expected {
            return Err(diverged(format!(
                "history {history:?}, expected {expected:?}"
            )));
        }

        if self.source.is_closed() != self.model.closed {
            return Err(diverged(format!(
                "closed = {}, expected {}",
                self.source.is_closed(),
                self.model.closed
            )));
        }

        let live = self.model.sinks.iter().filter(|s| s.connected).count();
        if self.source.connection_count() != live {
            return Err(diverged(format!(
                "{} connections, expected {live}",
                self.source.connection_count()
            )));
        }

        for (index, ((recorder, _), model)) in self.sinks.iter().zip(&self.model.sinks).enumerate() {
            let seen = recorder.events();
            if seen != model.expected {
                return Err(diverged(format!(
                    "sink {index} saw {seen:?}, expected {:?}",
                    model.expected
                )));
            }
        }

        Ok(())
    }

    /// Apply and check every operation in turn
    pub fn run(options: SourceOptions, ops: &[Op]) -> Result<Scenario, Divergence> {
        let mut scenario = Scenario::new(options);
        for &op in ops {
            if let Err(err) = scenario.apply(op) {
                return Err(Divergence {
                    step: scenario.steps,
                    op,
                    detail: format!("recorder sink failed: {err}"),
                });
            }
            scenario.check(op)?;
        }
        Ok(scenario)
    }
}
