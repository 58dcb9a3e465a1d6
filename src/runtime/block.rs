//! Block trait for dataflow stages
//!
//! A block is a pure step function over rows of items. The worker that drives it
//! does all channel I/O: it reads one item per input port, hands the row to
//! [`Block::step`], and writes whatever comes back to the output ports.

pub use super::errors::{WorkError, WorkResult};
use super::ports::PortSchema;
use std::fmt;

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// One item per declared output port, in port order
    Emit(Vec<T>),
    /// Inputs were consumed but nothing is emitted for this row
    Consumed,
    /// The block is done; its outputs get closed and it is never stepped again
    Exhausted,
}

/// Role of a block in the graph, derived from its port counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// No inputs
    Source,
    /// Inputs and outputs
    Transform,
    /// Inputs, no outputs
    Sink,
}

impl BlockKind {
    pub fn classify(num_inputs: usize, num_outputs: usize) -> Self {
        match (num_inputs, num_outputs) {
            (0, _) => BlockKind::Source,
            (_, 0) => BlockKind::Sink,
            _ => BlockKind::Transform,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            BlockKind::Source => "source",
            BlockKind::Transform => "transform",
            BlockKind::Sink => "sink",
        })
    }
}

/// A processing stage
/// - Sources have 0 inputs and N outputs
/// - Sinks have N inputs and 0 outputs
/// - Transforms have N inputs and M outputs
pub trait Block<T>: Send {
    /// Debug name, used in logs, errors and the run report
    fn name(&self) -> &str;

    /// Input ports in the order their items appear in a row
    fn input_schema(&self) -> Vec<PortSchema>;

    /// Output ports in the order `Step::Emit` lists their items
    fn output_schema(&self) -> Vec<PortSchema>;

    fn kind(&self) -> BlockKind {
        BlockKind::classify(self.input_schema().len(), self.output_schema().len())
    }

    /// Process one row of inputs (empty for sources).
    fn step(&mut self, inputs: Vec<T>) -> WorkResult<Step<T>>;
}

impl<T, B: Block<T> + ?Sized> Block<T> for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        (**self).input_schema()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        (**self).output_schema()
    }

    fn kind(&self) -> BlockKind {
        (**self).kind()
    }

    fn step(&mut self, inputs: Vec<T>) -> WorkResult<Step<T>> {
        (**self).step(inputs)
    }
}
