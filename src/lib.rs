//! Statically wired dataflow pipelines
//!
//! Blocks are connected through bounded, ordered channels identified by integer
//! keys, then driven until every source is exhausted and that exhaustion has reached
//! every downstream block.
//!
//! # Architecture
//!
//! - **Blocks**: sources, transforms and sinks implementing [`Block`]
//! - **Channels**: bounded FIFOs with backpressure and broadcast fan-out
//! - **Pipeline**: binds port names to channel keys and validates the graph
//! - **Schedulers**: one thread per block, or a single-threaded round robin
//!
//! # Example
//!
//! ```no_run
//! use blockflow::blocks::{CollectSink, SourceBlock, TransformBlock};
//! use blockflow::{Pipeline, PortMap};
//!
//! let sink = CollectSink::new("sink");
//! let collected = sink.collected();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add(SourceBlock::new("numbers", 0..10), PortMap::from([("out_1", 0)]))?;
//! pipeline.add(
//!     TransformBlock::map("square", |x: u64| x * x),
//!     PortMap::from([("in_1", 0), ("out_1", 1)]),
//! )?;
//! pipeline.add(sink, PortMap::from([("in_1", 1)]))?;
//!
//! let report = pipeline.run()?;
//! println!("{}", report);
//! assert_eq!(collected.len(), 10);
//! # Ok::<(), blockflow::PipelineError>(())
//! ```

pub mod blocks;
pub mod runtime;

// Re-export the runtime surface most users need
pub use runtime::{
    Block, BlockKind, BlockOutcome, BlockReport, ChannelError, ChannelKey, ExecutionMode,
    Pipeline, PipelineConfig, PipelineError, PortDirection, PortMap, PortSchema, RunReport,
    Scheduler, Step, StopHandle, WorkError, WorkResult,
};

pub type Result<T> = std::result::Result<T, PipelineError>;
