//! Job submission and the retry-by-requeue policy.
//!
//! Every job is dispatched through the pool: it runs at once on an idle
//! worker or waits in the FIFO queue. A failed exchange re-enters the queue
//! at the tail, behind everything already waiting, until its attempt budget
//! is spent; then the job resolves with no analysis. A worker left unusable
//! by the failure is retired first, so the retry lands on another worker.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::pool::{AnalysisTicket, Job, PoolShared, WorkerPool};
use crate::protocol::{Exchange, parse_analysis};
use crate::worker::EngineWorker;

const SCHEDULER_TARGET: &str = "ponder_engine::scheduler";

/// How a job finished, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    /// The engine produced a best move.
    Parsed,
    /// The exchange completed but no best move was found.
    Empty,
    /// Every attempt failed.
    Exhausted,
}

impl JobOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Empty => "empty",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Submits analysis jobs to a [`WorkerPool`].
pub struct Scheduler {
    pool: WorkerPool,
    next_job: AtomicU64,
}

impl Scheduler {
    /// Wraps an initialised pool.
    #[must_use]
    pub const fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            next_job: AtomicU64::new(1),
        }
    }

    /// Submits one exchange with an attempt budget of `retries`.
    ///
    /// The exchange runs immediately if a worker is idle and is queued
    /// otherwise. A budget of 0 or 1 allows a single attempt. Jobs submitted
    /// after termination are abandoned.
    pub fn submit(&self, exchange: Exchange, retries: u32) -> AnalysisTicket {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let (job, ticket) = Job::new(id, exchange, retries);
        debug!(target: SCHEDULER_TARGET, job = id, retries, "job submitted");
        self.pool.dispatch(job);
        ticket
    }

    /// The pool this scheduler dispatches to.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

/// Runs one attempt of `job` on the given worker and settles the outcome.
pub(crate) fn run_job(pool: &PoolShared, worker_index: usize, worker: &dyn EngineWorker, mut job: Job) {
    match worker.run_exchange(job.exchange()) {
        Ok(lines) => {
            let analysis = parse_analysis(&lines);
            let outcome = if analysis.is_some() {
                JobOutcome::Parsed
            } else {
                JobOutcome::Empty
            };
            debug!(
                target: SCHEDULER_TARGET,
                job = job.id(),
                worker = worker_index,
                attempt = job.attempt(),
                outcome = outcome.as_str(),
                "job finished"
            );
            job.resolve(analysis);
        }
        Err(error) if pool.is_terminated() => {
            debug!(
                target: SCHEDULER_TARGET,
                job = job.id(),
                error = %error,
                "pool terminated mid-exchange; abandoning job"
            );
        }
        Err(error) => {
            if error.retires_worker() {
                pool.retire(worker_index);
            }
            let failed_attempt = job.attempt();
            if job.advance_attempt() {
                warn!(
                    target: SCHEDULER_TARGET,
                    job = job.id(),
                    worker = worker_index,
                    attempt = failed_attempt,
                    retries = job.retries(),
                    error = %error,
                    "exchange failed; requeueing job"
                );
                pool.requeue(job);
            } else {
                info!(
                    target: SCHEDULER_TARGET,
                    job = job.id(),
                    worker = worker_index,
                    attempt = failed_attempt,
                    outcome = JobOutcome::Exhausted.as_str(),
                    error = %error,
                    "job out of attempts"
                );
                job.resolve(None);
            }
        }
    }
}
