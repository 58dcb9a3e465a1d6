//! Single-threaded round-robin scheduler
//!
//! Visits blocks in topological order, sources first, and steps each one whose next
//! row is fully available and whose outputs all have room. Because a block only
//! runs when nothing it does can block, one thread is enough to drive the whole
//! graph. A pass in which no block moves while some are unfinished means the graph
//! can never complete, and is reported as [`PipelineError::Stalled`].

use super::channel::Readiness;
use super::errors::PipelineError;
use super::report::{BlockOutcome, RunReport};
use super::worker::{BlockWorker, Flow};
use tracing::{debug, error, info};

pub(crate) fn run_cooperative<T: Clone + Send + 'static>(
    workers: Vec<BlockWorker<T>>,
    order: &[usize],
) -> Result<RunReport, PipelineError> {
    let mut slots: Vec<Option<BlockWorker<T>>> = workers
        .into_iter()
        .map(|worker| Some(worker.non_blocking()))
        .collect();
    let mut reports = Vec::with_capacity(slots.len());
    let mut passes = 0u64;

    info!("Running {} blocks cooperatively", slots.len());

    loop {
        passes += 1;
        let mut progressed = false;
        let mut live = 0usize;

        for &index in order {
            let Some(worker) = slots[index].as_mut() else {
                continue;
            };

            let flow = if worker.stop_requested() {
                debug!("[{}] Stop requested", worker.name());
                Ok(Flow::Done(BlockOutcome::Exhausted))
            } else {
                match worker.readiness() {
                    Readiness::Pending => {
                        live += 1;
                        continue;
                    }
                    Readiness::Exhausted => Ok(Flow::Done(BlockOutcome::Exhausted)),
                    Readiness::Ready => match worker.take_row() {
                        Some(row) => worker.execute(row),
                        None => {
                            live += 1;
                            continue;
                        }
                    },
                }
            };
            progressed = true;

            match flow {
                Ok(Flow::Continue) => live += 1,
                Ok(Flow::Done(outcome)) => {
                    if let Some(mut worker) = slots[index].take() {
                        reports.push(worker.finish(outcome));
                    }
                }
                Err(e) => {
                    if let Some(mut worker) = slots[index].take() {
                        error!("[{}] {}", worker.name(), e);
                        worker.finish(BlockOutcome::Failed);
                    }
                    abort_all(&mut slots);
                    return Err(e);
                }
            }
        }

        if live == 0 {
            break;
        }
        if !progressed {
            let blocks: Vec<String> = slots
                .iter()
                .flatten()
                .map(|w| w.name().to_string())
                .collect();
            error!("Cooperative run stalled after {} passes", passes);
            abort_all(&mut slots);
            return Err(PipelineError::Stalled { blocks });
        }
    }

    info!("Cooperative run completed in {} passes", passes);
    Ok(RunReport::new(reports))
}

fn abort_all<T: Clone + Send + 'static>(slots: &mut [Option<BlockWorker<T>>]) {
    for mut worker in slots.iter_mut().filter_map(Option::take) {
        worker.finish(BlockOutcome::Aborted);
    }
}
