//! Error types for the runtime system

use super::channel::ChannelKey;
use super::ports::PortDirection;

/// Error type for channel endpoint operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {key} was already closed by its producer")]
    Closed { key: ChannelKey },

    #[error("Channel {key} has no remaining readers")]
    Disconnected { key: ChannelKey },

    #[error("Pipeline aborted while waiting on a channel")]
    Aborted,
}

/// Error type for block step functions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),

    #[error("Expected {expected} output items, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl WorkError {
    /// Shorthand for a block-specific failure
    pub fn failed(message: impl Into<String>) -> Self {
        WorkError::Failed(message.into())
    }
}

/// Result type for block step functions
pub type WorkResult<T> = Result<T, WorkError>;

/// Error type for pipeline construction, validation and execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Block '{block}': {direction} port '{port}' has no channel mapping")]
    PortMapping {
        block: String,
        port: String,
        direction: PortDirection,
    },

    #[error("Block '{block}' has no port named '{port}'")]
    UnknownPort { block: String, port: String },

    #[error("Block '{block}' declares port '{port}' more than once")]
    InvalidSchema { block: String, port: String },

    #[error("Channel {key} is written by both '{first}' and '{second}'")]
    DuplicateProducer {
        key: ChannelKey,
        first: String,
        second: String,
    },

    #[error("Channel {key} read by '{block}.{port}' has no producer")]
    UnboundChannel {
        key: ChannelKey,
        block: String,
        port: String,
    },

    #[error("Cycle detected involving block '{block}'")]
    Cycle { block: String },

    #[error("Channel {key} has invalid capacity {capacity}")]
    InvalidCapacity { key: ChannelKey, capacity: usize },

    #[error("Put on channel {key} after it was closed")]
    ChannelClosed { key: ChannelKey },

    #[error("Block '{block}' failed: {source}")]
    StageExecution {
        block: String,
        #[source]
        source: WorkError,
    },

    #[error("No block can make progress: {}", blocks.join(", "))]
    Stalled { blocks: Vec<String> },
}
