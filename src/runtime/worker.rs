//! Execution unit wrapping one block and its channel endpoints
//!
//! The worker owns the block together with one [`Receiver`] per input port and one
//! optional [`Sender`] per output port (`None` for discarded outputs). Both
//! schedulers drive blocks exclusively through it, so row assembly, arity checks,
//! panic capture and shutdown behave identically in either mode.

use super::block::{Block, BlockKind, Step, WorkError};
use super::channel::{Readiness, TryGet};
use super::errors::{ChannelError, PipelineError};
use super::receiver::Receiver;
use super::report::{BlockOutcome, BlockReport};
use super::sender::{Sender, TryPutError};
use super::signal::Signal;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

/// What the scheduler should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Done(BlockOutcome),
}

pub(crate) struct BlockWorker<T> {
    index: usize,
    name: String,
    kind: BlockKind,
    block: Box<dyn Block<T>>,
    inputs: Vec<Receiver<T>>,
    outputs: Vec<Option<Sender<T>>>,
    had_live_outputs: bool,
    non_blocking: bool,
    stop: Signal,
    steps: u64,
    emitted: u64,
}

impl<T: Clone + Send + 'static> BlockWorker<T> {
    pub(crate) fn new(
        index: usize,
        block: Box<dyn Block<T>>,
        inputs: Vec<Receiver<T>>,
        outputs: Vec<Option<Sender<T>>>,
        stop: Signal,
    ) -> Self {
        let had_live_outputs = outputs
            .iter()
            .flatten()
            .any(|sender| sender.num_destinations() > 0);
        Self {
            index,
            name: block.name().to_string(),
            kind: block.kind(),
            block,
            inputs,
            outputs,
            had_live_outputs,
            non_blocking: false,
            stop,
            steps: 0,
            emitted: 0,
        }
    }

    /// Deliver outputs with `try_put`. Callers must check `readiness` first.
    pub(crate) fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Sources treat a raised stop signal as the end of their sequence
    pub(crate) fn stop_requested(&self) -> bool {
        self.kind == BlockKind::Source && self.stop.is_raised()
    }

    /// Blocking read of one item from every input, in port order.
    ///
    /// `Ok(None)` as soon as any input is exhausted; items already taken for the
    /// row are dropped, since the row can never be completed.
    pub(crate) fn read_row(&mut self) -> Result<Option<Vec<T>>, ChannelError> {
        let mut row = Vec::with_capacity(self.inputs.len());
        for input in &mut self.inputs {
            match input.get()? {
                Some(item) => row.push(item),
                None => {
                    debug!("[{}] Input channel {} exhausted", self.name, input.key());
                    return Ok(None);
                }
            }
        }
        Ok(Some(row))
    }

    /// Whether a full row is available and every output has room.
    pub(crate) fn readiness(&mut self) -> Readiness {
        let mut pending = false;
        for input in &mut self.inputs {
            match input.poll_ready() {
                Readiness::Exhausted => return Readiness::Exhausted,
                Readiness::Pending => pending = true,
                Readiness::Ready => {}
            }
        }
        if pending || !self.outputs.iter().flatten().all(Sender::has_capacity) {
            return Readiness::Pending;
        }
        Readiness::Ready
    }

    /// Take the row that `readiness` reported as available.
    ///
    /// If the row turns out incomplete, the items already taken are put back.
    pub(crate) fn take_row(&mut self) -> Option<Vec<T>> {
        let mut row = Vec::with_capacity(self.inputs.len());
        for i in 0..self.inputs.len() {
            match self.inputs[i].try_get() {
                TryGet::Item(item) => row.push(item),
                TryGet::Empty | TryGet::Exhausted => {
                    for (input, item) in self.inputs.iter_mut().zip(row) {
                        input.put_back(item);
                    }
                    return None;
                }
            }
        }
        Some(row)
    }

    /// Run one step on `row` and deliver its outputs.
    pub(crate) fn execute(&mut self, row: Vec<T>) -> Result<Flow, PipelineError> {
        let block = &mut self.block;
        let result = panic::catch_unwind(AssertUnwindSafe(|| block.step(row)))
            .unwrap_or_else(|payload| Err(WorkError::Panicked(panic_message(payload.as_ref()))));

        let step = result.map_err(|source| self.stage_error(source))?;
        match step {
            // Sinks have nowhere to send items; whatever they return is dropped
            Step::Emit(_) if self.kind == BlockKind::Sink => {
                self.steps += 1;
                Ok(Flow::Continue)
            }
            Step::Emit(items) => {
                if items.len() != self.outputs.len() {
                    return Err(self.stage_error(WorkError::Arity {
                        expected: self.outputs.len(),
                        got: items.len(),
                    }));
                }
                self.steps += 1;
                self.emit(items)
            }
            Step::Consumed => {
                self.steps += 1;
                Ok(Flow::Continue)
            }
            Step::Exhausted => {
                debug!("[{}] Sequence exhausted", self.name);
                Ok(Flow::Done(BlockOutcome::Exhausted))
            }
        }
    }

    fn emit(&mut self, items: Vec<T>) -> Result<Flow, PipelineError> {
        for (slot, item) in self.outputs.iter_mut().zip(items) {
            let Some(sender) = slot.as_mut() else {
                self.emitted += 1;
                continue;
            };
            let delivered = if self.non_blocking {
                match sender.try_put(item) {
                    Ok(()) => Ok(()),
                    // `readiness` saw room on every output, so this cannot wait long
                    Err(TryPutError::Full(item)) => sender.put(item),
                    Err(TryPutError::Closed(_)) => Err(ChannelError::Closed { key: sender.key() }),
                    Err(TryPutError::Disconnected(_)) => {
                        Err(ChannelError::Disconnected { key: sender.key() })
                    }
                }
            } else {
                sender.put(item)
            };
            match delivered {
                Ok(()) => self.emitted += 1,
                Err(ChannelError::Disconnected { key }) => {
                    debug!("[{}] All readers of channel {} are gone", self.name, key);
                    *slot = None;
                }
                Err(ChannelError::Closed { key }) => {
                    return Err(PipelineError::ChannelClosed { key });
                }
                Err(ChannelError::Aborted) => return Ok(Flow::Done(BlockOutcome::Aborted)),
            }
        }

        if self.had_live_outputs && self.outputs.iter().all(Option::is_none) {
            return Ok(Flow::Done(BlockOutcome::Abandoned));
        }
        Ok(Flow::Continue)
    }

    fn stage_error(&self, source: WorkError) -> PipelineError {
        PipelineError::StageExecution {
            block: self.name.clone(),
            source,
        }
    }

    /// Close every output and release every input, then summarise.
    ///
    /// Inputs are drained before they are dropped so producers waiting on a full
    /// queue see the reader disappear instead of a queue that never empties.
    pub(crate) fn finish(&mut self, outcome: BlockOutcome) -> BlockReport {
        for sender in self.outputs.iter_mut().flatten() {
            sender.close();
        }
        self.outputs.clear();
        for input in &mut self.inputs {
            input.drain();
        }
        self.inputs.clear();

        info!(
            "[{}] Shutdown ({:?}). Steps {}. Emitted {}.",
            self.name, outcome, self.steps, self.emitted
        );

        BlockReport {
            index: self.index,
            name: self.name.clone(),
            kind: self.kind,
            steps: self.steps,
            emitted: self.emitted,
            outcome,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
