//! Runtime support for streaming block graphs

pub mod block;
pub mod channel;
pub mod config;
mod cooperative;
pub mod errors;
pub mod graph;
pub mod pipeline;
pub mod ports;
pub mod receiver;
pub mod report;
pub mod scheduler;
pub mod sender;
pub mod signal;
pub mod watchdog;
mod worker;

pub use block::{Block, BlockKind, Step};
pub use channel::{ChannelKey, Readiness, TryGet, broadcast, channel};
pub use config::{ExecutionMode, PipelineConfig};
pub use errors::{ChannelError, PipelineError, WorkError, WorkResult};
pub use graph::{ChannelGraph, ChannelInfo, Endpoint};
pub use pipeline::Pipeline;
pub use ports::{PortDirection, PortMap, PortSchema};
pub use receiver::Receiver;
pub use report::{BlockOutcome, BlockReport, RunReport};
pub use scheduler::Scheduler;
pub use sender::{Sender, TryPutError};
pub use signal::StopHandle;
pub use watchdog::{Watchdog, WatchdogHandle};
