//! Dedicated worker threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use super::{PoolShared, Task};
use crate::error::EngineError;
use crate::protocol::Exchange;
use crate::scheduler;
use crate::worker::EngineWorker;

const RUNNER_TARGET: &str = "ponder_engine::runner";

/// Starts the thread that drives worker `index` and returns its inbox.
///
/// The thread exits once the pool drops the inbox sender.
pub(super) fn spawn(
    shared: Arc<PoolShared>,
    index: usize,
    worker: Arc<dyn EngineWorker>,
) -> Result<Sender<Task>, EngineError> {
    let (inbox, tasks) = mpsc::channel();
    thread::Builder::new()
        .name(format!("ponder-worker-{index}"))
        .spawn(move || run(&shared, index, worker.as_ref(), &tasks))
        .map_err(|source| EngineError::WorkerThread {
            worker: index,
            source: Arc::new(source),
        })?;
    Ok(inbox)
}

fn run(shared: &PoolShared, index: usize, worker: &dyn EngineWorker, tasks: &Receiver<Task>) {
    while let Ok(first) = tasks.recv() {
        let mut next = Some(first);
        while let Some(task) = next {
            perform(shared, index, worker, task);
            next = shared.release(index);
        }
    }
    debug!(target: RUNNER_TARGET, worker = index, "worker thread stopped");
}

/// Runs one task. A panic is contained so the worker is always released.
fn perform(shared: &PoolShared, index: usize, worker: &dyn EngineWorker, task: Task) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match task {
        Task::Analyse(job) => scheduler::run_job(shared, index, worker, job),
        Task::Reset(acks) => reset(shared, index, worker, &acks),
    }));
    if outcome.is_err() {
        error!(target: RUNNER_TARGET, worker = index, "worker task panicked; releasing worker");
    }
}

fn reset(shared: &PoolShared, index: usize, worker: &dyn EngineWorker, acks: &[Sender<()>]) {
    match worker.run_exchange(&Exchange::new_game()) {
        Ok(_) => debug!(target: RUNNER_TARGET, worker = index, "worker reset for a new game"),
        Err(error) => {
            warn!(
                target: RUNNER_TARGET,
                worker = index,
                error = %error,
                "worker reset failed"
            );
            if error.retires_worker() {
                shared.retire(index);
            }
        }
    }
    for ack in acks {
        if ack.send(()).is_err() {
            debug!(target: RUNNER_TARGET, worker = index, "reset requester stopped waiting");
        }
    }
}
