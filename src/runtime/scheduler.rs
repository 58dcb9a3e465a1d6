//! Thread-per-block scheduler
//!
//! Spawns a dedicated thread for each block. Every thread loops: read one row from
//! the block's inputs (blocking), step the block, write the outputs (blocking on
//! full channels). A thread ends when its inputs are exhausted, its source sequence
//! ends, all its readers are gone, or the pipeline aborts. On the way out it closes
//! its outputs and drops its inputs, which is what lets its neighbours finish.
//!
//! The first stage error raises the abort signal; blocked channel operations
//! observe it on their next poll, so a failed run always winds down.

use super::errors::{PipelineError, WorkError};
use super::report::{BlockOutcome, BlockReport, RunReport};
use super::signal::{Signal, StopHandle};
use super::watchdog::Watchdog;
use super::worker::{BlockWorker, Flow};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

type ErrorSlot = Arc<Mutex<Option<PipelineError>>>;

/// Running pipeline in threaded mode
pub struct Scheduler {
    threads: Vec<(String, Option<JoinHandle<()>>)>,
    stop: Signal,
    abort: Signal,
    first_error: ErrorSlot,
    completion_tx: StdSender<(usize, BlockReport)>,
    completion_rx: StdReceiver<(usize, BlockReport)>,
    watchdog: Option<(Watchdog, JoinHandle<()>)>,
}

impl Scheduler {
    pub(crate) fn new(stop: Signal, abort: Signal, watchdog: Option<Watchdog>) -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog = watchdog.map(|watchdog| {
            info!(
                "Watchdog enabled - will report channel operations blocked >{:?}",
                watchdog.threshold()
            );
            let handle = watchdog.start_monitoring_thread();
            (watchdog, handle)
        });
        Self {
            threads: Vec::new(),
            stop,
            abort,
            first_error: Arc::new(Mutex::new(None)),
            completion_tx,
            completion_rx,
            watchdog,
        }
    }

    /// Start a block in its own thread
    pub(crate) fn start_block<T: Clone + Send + 'static>(&mut self, mut worker: BlockWorker<T>) {
        let slot = self.threads.len();
        let abort = self.abort.clone();
        let first_error = Arc::clone(&self.first_error);
        let completion_tx = self.completion_tx.clone();
        let name = worker.name().to_string();

        debug!("Starting block #{}: {}", worker.index(), name);

        let handle = thread::spawn(move || {
            let outcome = drive(&mut worker, &abort, &first_error);
            let report = worker.finish(outcome);
            let _ = completion_tx.send((slot, report));
        });

        self.threads.push((name, Some(handle)));
    }

    /// Ask every source to end its sequence. Downstream blocks finish normally.
    pub fn stop(&self) {
        self.stop.raise();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::from_signal(self.stop.clone())
    }

    /// Wait for every block thread to finish.
    ///
    /// Returns the first stage error if any block failed.
    pub fn wait(mut self) -> Result<RunReport, PipelineError> {
        // Only the worker threads hold senders from here on
        drop(self.completion_tx);

        let total = self.threads.len();
        let mut reports = Vec::with_capacity(total);

        info!("Waiting for {} blocks to complete...", total);

        while reports.len() < total {
            match self.completion_rx.recv() {
                Ok((slot, report)) => {
                    if let Some(handle) = self.threads[slot].1.take() {
                        let _ = handle.join();
                    }
                    debug!(
                        "[{}] Thread completed ({}/{})",
                        report.name,
                        reports.len() + 1,
                        total
                    );
                    reports.push(report);
                }
                Err(_) => break,
            }
        }

        for (name, handle) in &mut self.threads {
            if let Some(handle) = handle.take()
                && handle.join().is_err()
            {
                error!("[{}] Thread panicked", name);
                record(
                    &self.first_error,
                    PipelineError::StageExecution {
                        block: name.clone(),
                        source: WorkError::Panicked(
                            "block thread panicked outside of step".to_string(),
                        ),
                    },
                );
            }
        }

        info!("All {} blocks completed", total);

        if let Some((watchdog, handle)) = self.watchdog.take() {
            watchdog.stop();
            let _ = handle.join();
        }

        let first_error = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first_error {
            Some(error) => Err(error),
            None => Ok(RunReport::new(reports)),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

fn drive<T: Clone + Send + 'static>(
    worker: &mut BlockWorker<T>,
    abort: &Signal,
    first_error: &ErrorSlot,
) -> BlockOutcome {
    loop {
        if abort.is_raised() {
            return BlockOutcome::Aborted;
        }
        if worker.stop_requested() {
            debug!("[{}] Stop requested", worker.name());
            return BlockOutcome::Exhausted;
        }

        let row = match worker.read_row() {
            Ok(Some(row)) => row,
            Ok(None) => return BlockOutcome::Exhausted,
            Err(_) => return BlockOutcome::Aborted,
        };

        match worker.execute(row) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done(outcome)) => return outcome,
            Err(e) => {
                error!("[{}] {}", worker.name(), e);
                record(first_error, e);
                abort.raise();
                return BlockOutcome::Failed;
            }
        }
    }
}

/// Keep only the first error
fn record(first_error: &ErrorSlot, error: PipelineError) {
    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(error);
    }
}
