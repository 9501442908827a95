//! Topology builders
//!
//! Shortcuts for wiring sources into chains and fan-outs.

use rill_core::{Connection, Source, SourceOptions, SourceResult};

use crate::Recorder;

/// Sources piped one after another, head first
pub struct Chain<T> {
    nodes: Vec<Source<T>>,
    links: Vec<Connection<T>>,
}

impl<T: Clone + Send + 'static> Chain<T> {
    /// Build a chain of `len` sources (at least one) sharing `options`
    pub fn new(len: usize, options: SourceOptions) -> SourceResult<Self> {
        Self::from_options(vec![options; len.max(1)])
    }

    /// Build a chain with one source per entry of `options`
    pub fn from_options(options: Vec<SourceOptions>) -> SourceResult<Self> {
        let nodes: Vec<Source<T>> = options.into_iter().map(Source::new).collect();
        let mut links = Vec::with_capacity(nodes.len().saturating_sub(1));

        for pair in nodes.windows(2) {
            links.push(pair[0].pipe(&pair[1])?);
        }

        Ok(Self { nodes, links })
    }

    /// First source, where values enter
    pub fn head(&self) -> &Source<T> {
        &self.nodes[0]
    }

    /// Last source, where sinks attach
    pub fn tail(&self) -> &Source<T> {
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[Source<T>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Disconnect the link between node `index` and node `index + 1`
    pub fn cut(&self, index: usize) {
        if let Some(link) = self.links.get(index) {
            link.disconnect();
        }
    }
}

/// Connect `width` fresh recorders to `source`, in order
pub fn fan_out<T>(source: &Source<T>, width: usize) -> SourceResult<Vec<Recorder<T>>>
where
    T: Clone + Send + 'static,
{
    let mut recorders = Vec::with_capacity(width);
    for _ in 0..width {
        let recorder = Recorder::new();
        source.connect(recorder.clone())?;
        recorders.push(recorder);
    }
    Ok(recorders)
}
