//! Fixed-size pool of engine workers.
//!
//! The pool owns every worker for its whole life together with the pending
//! queue. Worker states and the queue live behind a single mutex, which makes
//! acquire, release, enqueue and requeue one serialized region: two callers can
//! never claim the same idle worker, and a job is never both queued and
//! assigned.
//!
//! Each worker gets a dedicated thread that receives tasks through an inbox.
//! When a task finishes, the thread releases its worker: the next queued job
//! is handed straight to the same worker without it ever becoming idle, and
//! only an empty queue marks it idle again.
//!
//! A worker whose process has died is retired: its slot leaves the pool and
//! its process is stopped, so retries and later jobs only reach live workers.
//! Once the last worker is retired the queue is abandoned.

mod job;
mod runner;

use std::collections::VecDeque;
use std::mem;
use std::sync::mpsc::{self, SendError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::protocol::Exchange;
use crate::worker::{EngineWorker, WorkerFactory};

pub use job::AnalysisTicket;
pub(crate) use job::Job;

/// Log target for pool bookkeeping.
const POOL_TARGET: &str = "ponder_engine::pool";

/// Availability of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Idle,
    Busy,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Usable workers currently owned by the pool.
    pub workers: usize,
    /// Workers waiting for work.
    pub idle: usize,
    /// Workers running a job or a reset.
    pub busy: usize,
    /// Jobs waiting for a free worker.
    pub queued: usize,
}

/// Work delivered to a worker thread.
pub(crate) enum Task {
    Analyse(Job),
    /// A new-game reset, acknowledged to every waiting caller once it has run.
    Reset(Vec<Sender<()>>),
}

struct WorkerSlot {
    index: usize,
    worker: Arc<dyn EngineWorker>,
    state: WorkerState,
    pending_resets: Vec<Sender<()>>,
    inbox: Sender<Task>,
}

#[derive(Default)]
struct PoolState {
    slots: Vec<WorkerSlot>,
    queue: VecDeque<Job>,
    terminated: bool,
}

impl PoolState {
    /// Claims the first idle worker.
    fn acquire_idle(&mut self) -> Option<&mut WorkerSlot> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.state == WorkerState::Idle)?;
        slot.state = WorkerState::Busy;
        Some(slot)
    }

    /// Picks the next task for a worker that just finished one.
    ///
    /// A reset requested while the worker was busy runs first. Otherwise the
    /// head of the queue goes straight to this worker. With nothing to do the
    /// worker becomes idle and `None` is returned.
    fn next_task(&mut self, index: usize) -> Option<Task> {
        if self.terminated {
            return None;
        }

        let slot = self.slots.iter_mut().find(|slot| slot.index == index)?;
        if !slot.pending_resets.is_empty() {
            return Some(Task::Reset(mem::take(&mut slot.pending_resets)));
        }
        if let Some(job) = self.queue.pop_front() {
            debug!(
                target: POOL_TARGET,
                worker = index,
                job = job.id(),
                queued = self.queue.len(),
                "handing queued job to released worker"
            );
            return Some(Task::Analyse(job));
        }

        slot.state = WorkerState::Idle;
        None
    }

    /// Runs `job` on an idle worker, or appends it to the queue when every
    /// worker is busy.
    ///
    /// An idle worker implies an empty queue, so a job placed on a worker never
    /// overtakes a waiting one. Workers whose thread has gone are retired and
    /// returned for the caller to stop outside the lock.
    fn place(&mut self, job: Job) -> Vec<WorkerSlot> {
        let mut retired = Vec::new();
        let mut pending = job;
        while let Some(slot) = self.acquire_idle() {
            let index = slot.index;
            let id = pending.id();
            match slot.inbox.send(Task::Analyse(pending)) {
                Ok(()) => {
                    debug!(target: POOL_TARGET, worker = index, job = id, "dispatched job");
                    return retired;
                }
                Err(SendError(task)) => {
                    error!(
                        target: POOL_TARGET,
                        worker = index,
                        job = id,
                        "worker thread is gone; retiring worker"
                    );
                    retired.extend(self.retire(index));
                    let Task::Analyse(returned) = task else {
                        return retired;
                    };
                    pending = returned;
                }
            }
        }

        if self.slots.is_empty() {
            warn!(target: POOL_TARGET, job = pending.id(), "no usable workers left; abandoning job");
            return retired;
        }
        self.queue.push_back(pending);
        debug!(target: POOL_TARGET, queued = self.queue.len(), "all workers busy; job queued");
        retired
    }

    /// Removes worker `index` from the pool.
    ///
    /// Dropping the slot closes its inbox, which ends the worker thread, and
    /// releases anyone waiting on its resets. The queue is abandoned when no
    /// worker is left to drain it.
    fn retire(&mut self, index: usize) -> Option<WorkerSlot> {
        let position = self.slots.iter().position(|slot| slot.index == index)?;
        let slot = self.slots.remove(position);
        if self.slots.is_empty() && !self.queue.is_empty() {
            warn!(
                target: POOL_TARGET,
                abandoned = self.queue.len(),
                "no usable workers left; abandoning queued jobs"
            );
            self.queue.clear();
        }
        Some(slot)
    }
}

/// Stops the processes of retired workers.
fn stop(retired: Vec<WorkerSlot>) {
    for slot in retired {
        slot.worker.terminate();
    }
}

/// Pool bookkeeping shared with the worker threads.
#[derive(Default)]
pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Nothing panics while the lock is held, so a poisoned guard still
        // holds consistent bookkeeping.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the first idle worker, returning its index.
    pub(crate) fn acquire_idle(&self) -> Option<usize> {
        self.lock().acquire_idle().map(|slot| slot.index)
    }

    /// Runs `job` on an idle worker, or appends it to the queue when every
    /// worker is busy. Both happen under one lock.
    pub(crate) fn dispatch(&self, job: Job) {
        let retired = {
            let mut state = self.lock();
            if state.terminated {
                warn!(target: POOL_TARGET, job = job.id(), "pool terminated; dropping submitted job");
                return;
            }
            state.place(job)
        };
        stop(retired);
    }

    /// Sends a failed job round again behind every waiting job. An idle
    /// worker takes it at once. Dropped if the pool has terminated.
    pub(crate) fn requeue(&self, job: Job) {
        let retired = {
            let mut state = self.lock();
            if state.terminated {
                debug!(target: POOL_TARGET, job = job.id(), "pool terminated; abandoning retry");
                return;
            }
            state.place(job)
        };
        stop(retired);
    }

    /// Takes worker `index` out of the pool and stops its process.
    ///
    /// Called when an exchange left the worker unusable. Its thread exits
    /// after the current task. A no-op once the pool has terminated.
    pub(crate) fn retire(&self, index: usize) {
        let (retired, remaining) = {
            let mut state = self.lock();
            (state.retire(index), state.slots.len())
        };
        let Some(slot) = retired else {
            return;
        };
        warn!(
            target: POOL_TARGET,
            worker = index,
            remaining,
            "engine process is unusable; retiring worker"
        );
        slot.worker.terminate();
    }

    /// Returns a worker to service after a task and yields its next task.
    pub(crate) fn release(&self, index: usize) -> Option<Task> {
        self.lock().next_task(index)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    fn status(&self) -> PoolStatus {
        let state = self.lock();
        let idle = state
            .slots
            .iter()
            .filter(|slot| slot.state == WorkerState::Idle)
            .count();
        PoolStatus {
            workers: state.slots.len(),
            idle,
            busy: state.slots.len() - idle,
            queued: state.queue.len(),
        }
    }
}

/// Owns a fixed set of engine workers and the queue of jobs waiting for them.
///
/// The pool is sized once at initialisation and never grows. A worker whose
/// process dies is retired rather than replaced. Dropping the pool terminates
/// every worker.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Starts `min(concurrency, recommended_workers())` workers.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::initialize_with_limit`].
    pub fn initialize(factory: &dyn WorkerFactory, concurrency: usize) -> Result<Self, EngineError> {
        Self::initialize_with_limit(factory, concurrency, ponder_config::recommended_workers())
    }

    /// Starts `min(concurrency, limit)` workers, at least one, and handshakes
    /// each of them concurrently.
    ///
    /// A worker whose handshake fails is terminated and left out; the others
    /// still join the pool.
    ///
    /// # Errors
    ///
    /// Propagates the first construction error from `factory` after stopping
    /// the workers already started. Returns [`EngineError::NoUsableWorkers`]
    /// when every handshake fails.
    pub fn initialize_with_limit(
        factory: &dyn WorkerFactory,
        concurrency: usize,
        limit: usize,
    ) -> Result<Self, EngineError> {
        let size = concurrency.min(limit).max(1);
        info!(
            target: POOL_TARGET,
            requested = concurrency,
            limit,
            size,
            "starting engine workers"
        );

        let mut workers: Vec<Arc<dyn EngineWorker>> = Vec::with_capacity(size);
        for index in 0..size {
            match factory.spawn(index) {
                Ok(worker) => workers.push(Arc::from(worker)),
                Err(error) => {
                    for worker in &workers {
                        worker.terminate();
                    }
                    return Err(error);
                }
            }
        }

        let ready = handshake_all(workers);
        if ready.is_empty() {
            return Err(EngineError::NoUsableWorkers { requested: size });
        }

        let shared = Arc::new(PoolShared::default());
        let mut slots = Vec::with_capacity(ready.len());
        for (index, worker) in &ready {
            match runner::spawn(Arc::clone(&shared), *index, Arc::clone(worker)) {
                Ok(inbox) => slots.push(WorkerSlot {
                    index: *index,
                    worker: Arc::clone(worker),
                    state: WorkerState::Idle,
                    pending_resets: Vec::new(),
                    inbox,
                }),
                Err(error) => {
                    for (_, started) in &ready {
                        started.terminate();
                    }
                    return Err(error);
                }
            }
        }

        info!(target: POOL_TARGET, workers = slots.len(), "engine workers ready");
        shared.lock().slots = slots;
        Ok(Self { shared })
    }

    /// Starts a new analysis session on every worker.
    ///
    /// Idle workers reset immediately; busy workers reset as soon as their
    /// current job finishes and before they take another one. Blocks until
    /// every reset has run. Per-worker failures are logged, never returned.
    pub fn reset_all(&self) {
        let mut pending = Vec::new();
        let mut retired = Vec::new();
        {
            let mut state = self.shared.lock();
            if state.terminated {
                return;
            }
            let mut gone = Vec::new();
            for slot in &mut state.slots {
                let (ack, done) = mpsc::channel();
                match slot.state {
                    WorkerState::Idle => {
                        slot.state = WorkerState::Busy;
                        if slot.inbox.send(Task::Reset(vec![ack])).is_err() {
                            warn!(target: POOL_TARGET, worker = slot.index, "worker thread is gone; retiring worker");
                            gone.push(slot.index);
                            continue;
                        }
                    }
                    WorkerState::Busy => slot.pending_resets.push(ack),
                }
                pending.push((slot.index, done));
            }
            for index in gone {
                retired.extend(state.retire(index));
            }
        }
        stop(retired);

        for (index, done) in pending {
            if done.recv().is_err() {
                debug!(target: POOL_TARGET, worker = index, "worker stopped before its reset ran");
            }
        }
    }

    /// Claims the first idle worker, returning its index.
    ///
    /// The claimed worker stays busy until [`WorkerPool::release`] is called
    /// for it.
    #[must_use]
    pub fn acquire_idle(&self) -> Option<usize> {
        self.shared.acquire_idle()
    }

    /// Returns a worker claimed with [`WorkerPool::acquire_idle`].
    ///
    /// If jobs are queued, the head job is handed to this worker immediately;
    /// otherwise the worker becomes idle.
    pub fn release(&self, index: usize) {
        let retired = {
            let mut state = self.shared.lock();
            let Some(task) = state.next_task(index) else {
                return;
            };
            let Some(slot) = state.slots.iter().find(|slot| slot.index == index) else {
                return;
            };
            let Err(SendError(task)) = slot.inbox.send(task) else {
                return;
            };
            error!(target: POOL_TARGET, worker = index, "worker thread is gone; retiring worker");
            let mut retired: Vec<WorkerSlot> = state.retire(index).into_iter().collect();
            if let Task::Analyse(job) = task {
                retired.extend(state.place(job));
            }
            retired
        };
        stop(retired);
    }

    pub(crate) fn dispatch(&self, job: Job) {
        self.shared.dispatch(job);
    }

    /// Stops every worker and discards the pool and its queue.
    ///
    /// Jobs still queued are abandoned: their tickets never receive an
    /// analysis. Jobs running on a worker are abandoned when the exchange
    /// fails. Calling this more than once is harmless.
    pub fn terminate_all(&self) {
        let (slots, abandoned) = {
            let mut state = self.shared.lock();
            state.terminated = true;
            (mem::take(&mut state.slots), mem::take(&mut state.queue))
        };

        if !abandoned.is_empty() {
            warn!(
                target: POOL_TARGET,
                abandoned = abandoned.len(),
                "terminating pool with queued jobs"
            );
        }
        drop(abandoned);

        if slots.is_empty() {
            return;
        }
        let workers = slots.len();
        for slot in slots {
            slot.worker.terminate();
        }
        info!(target: POOL_TARGET, workers, "engine workers terminated");
    }

    /// Number of usable workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.lock().slots.len()
    }

    /// Current occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.shared.status()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

/// Handshakes every worker in parallel and keeps the ones that answered.
fn handshake_all(workers: Vec<Arc<dyn EngineWorker>>) -> Vec<(usize, Arc<dyn EngineWorker>)> {
    let answered: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                thread::Builder::new()
                    .name(format!("ponder-handshake-{index}"))
                    .spawn_scoped(scope, move || handshake(index, worker.as_ref()))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| match handle {
                Ok(handle) => handle.join().unwrap_or(false),
                Err(_) => workers
                    .get(index)
                    .is_some_and(|worker| handshake(index, worker.as_ref())),
            })
            .collect()
    });

    workers
        .into_iter()
        .enumerate()
        .zip(answered)
        .filter_map(|((index, worker), ok)| {
            if ok {
                Some((index, worker))
            } else {
                worker.terminate();
                None
            }
        })
        .collect()
}

fn handshake(index: usize, worker: &dyn EngineWorker) -> bool {
    match worker.run_exchange(&Exchange::handshake()) {
        Ok(_) => {
            debug!(target: POOL_TARGET, worker = index, "worker handshake complete");
            true
        }
        Err(error) => {
            warn!(
                target: POOL_TARGET,
                worker = index,
                error = %error,
                "worker handshake failed; leaving it out of the pool"
            );
            false
        }
    }
}
