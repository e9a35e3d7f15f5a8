//! Scripted in-memory workers for exercising the pool without processes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{EngineError, TransportError};
use crate::protocol::Exchange;
use crate::worker::{EngineWorker, WorkerFactory};

/// Upper bound for any wait in the tests.
pub(crate) const PATIENCE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ScriptState {
    gate_open: bool,
    failures: HashMap<String, usize>,
    empty: HashSet<String>,
    failing_handshakes: HashSet<usize>,
    crashed: HashSet<usize>,
    terminated: HashSet<usize>,
    running: HashSet<usize>,
    overlap: bool,
    peak: usize,
    searches: Vec<String>,
    events: Vec<(usize, String)>,
    handshakes: Vec<usize>,
    resets: Vec<usize>,
}

/// Shared behaviour and recordings for every scripted worker.
pub(crate) struct Script {
    state: Mutex<ScriptState>,
    changed: Condvar,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                gate_open: true,
                ..ScriptState::default()
            }),
            changed: Condvar::new(),
        }
    }
}

impl Script {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script lock")
    }

    fn update(&self, change: impl FnOnce(&mut ScriptState)) {
        change(&mut *self.lock());
        self.changed.notify_all();
    }

    /// Holds every search at its start until [`Script::open_gate`].
    pub(crate) fn close_gate(&self) {
        self.update(|state| state.gate_open = false);
    }

    pub(crate) fn open_gate(&self) {
        self.update(|state| state.gate_open = true);
    }

    /// Makes the next `times` searches of `fen` time out. A timed-out worker
    /// stays in the pool.
    pub(crate) fn fail_search(&self, fen: &str, times: usize) {
        self.update(|state| {
            state.failures.insert(fen.to_owned(), times);
        });
    }

    /// Makes searches of `fen` finish without a best move.
    pub(crate) fn answer_empty(&self, fen: &str) {
        self.update(|state| {
            state.empty.insert(fen.to_owned());
        });
    }

    /// Makes every search on `worker` fail as if its process had exited.
    pub(crate) fn crash_worker(&self, worker: usize) {
        self.update(|state| {
            state.crashed.insert(worker);
        });
    }

    pub(crate) fn fail_handshake(&self, worker: usize) {
        self.update(|state| {
            state.failing_handshakes.insert(worker);
        });
    }

    /// Blocks until `count` searches have started. Returns `false` on timeout.
    pub(crate) fn wait_for_searches(&self, count: usize) -> bool {
        let deadline = Instant::now() + PATIENCE;
        let mut state = self.lock();
        while state.searches.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .expect("script lock")
                .0;
        }
        true
    }

    /// Positions searched so far, in start order, one entry per attempt.
    pub(crate) fn searches(&self) -> Vec<String> {
        self.lock().searches.clone()
    }

    /// Everything `worker` ran, in order.
    pub(crate) fn events_for(&self, worker: usize) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter(|(index, _)| *index == worker)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub(crate) fn handshakes(&self) -> Vec<usize> {
        let mut handshakes = self.lock().handshakes.clone();
        handshakes.sort_unstable();
        handshakes
    }

    pub(crate) fn resets(&self) -> Vec<usize> {
        let mut resets = self.lock().resets.clone();
        resets.sort_unstable();
        resets
    }

    pub(crate) fn is_terminated(&self, worker: usize) -> bool {
        self.lock().terminated.contains(&worker)
    }

    /// Whether any worker ever ran two exchanges at once.
    pub(crate) fn saw_overlap(&self) -> bool {
        self.lock().overlap
    }

    /// Highest number of searches running at the same time.
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.lock().peak
    }

    fn search(&self, worker: usize, fen: &str) -> Result<Vec<String>, EngineError> {
        let mut state = self.lock();
        if !state.running.insert(worker) {
            state.overlap = true;
        }
        state.peak = state.peak.max(state.running.len());
        state.searches.push(fen.to_owned());
        state.events.push((worker, format!("search {fen}")));
        self.changed.notify_all();

        while !state.gate_open && !state.terminated.contains(&worker) {
            state = self.changed.wait(state).expect("script lock");
        }
        state.running.remove(&worker);

        if state.terminated.contains(&worker) {
            return Err(EngineError::Terminated);
        }
        if state.crashed.contains(&worker) {
            return Err(EngineError::ProcessExited);
        }
        if let Some(remaining) = state.failures.get_mut(fen) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::TimedOut { timeout_ms: 0 }.into());
            }
        }
        if state.empty.contains(fen) {
            return Ok(vec![String::from("info depth 1 nodes 20")]);
        }
        Ok(vec![
            format!("info depth 12 score cp 31 pv {fen} e7e5"),
            format!("bestmove {fen}"),
        ])
    }
}

/// Worker whose replies come from a shared [`Script`].
pub(crate) struct ScriptedWorker {
    index: usize,
    script: Arc<Script>,
}

impl ScriptedWorker {
    pub(crate) fn new(index: usize, script: Arc<Script>) -> Self {
        Self { index, script }
    }
}

impl EngineWorker for ScriptedWorker {
    fn run_exchange(&self, exchange: &Exchange) -> Result<Vec<String>, EngineError> {
        let first = exchange.commands().first().cloned().unwrap_or_default();
        if self.script.is_terminated(self.index) {
            return Err(EngineError::Terminated);
        }
        if first == "uci" {
            let failing = {
                let mut state = self.script.lock();
                state.handshakes.push(self.index);
                state.failing_handshakes.contains(&self.index)
            };
            return if failing {
                Err(EngineError::ProcessExited)
            } else {
                Ok(vec![String::from("uciok"), String::from("readyok")])
            };
        }
        if first == "ucinewgame" {
            self.script.update(|state| {
                state.resets.push(self.index);
                state.events.push((self.index, String::from("reset")));
            });
            return Ok(vec![String::from("readyok")]);
        }
        let fen = first.strip_prefix("position fen ").unwrap_or(&first);
        self.script.search(self.index, fen)
    }

    fn terminate(&self) {
        self.script.update(|state| {
            state.terminated.insert(self.index);
        });
    }
}

/// Builds [`ScriptedWorker`]s sharing one script.
pub(crate) struct ScriptedFactory {
    script: Arc<Script>,
}

impl ScriptedFactory {
    pub(crate) fn new(script: &Arc<Script>) -> Self {
        Self {
            script: Arc::clone(script),
        }
    }
}

impl WorkerFactory for ScriptedFactory {
    fn spawn(&self, index: usize) -> Result<Box<dyn EngineWorker>, EngineError> {
        Ok(Box::new(ScriptedWorker::new(index, Arc::clone(&self.script))))
    }
}

mockall::mock! {
    pub Factory {}

    impl WorkerFactory for Factory {
        fn spawn(&self, index: usize) -> Result<Box<dyn EngineWorker>, EngineError>;
    }
}
