//! High-level entry point tying the pool and scheduler together.

use ponder_config::Config;
use tracing::info;

use crate::error::{EngineError, TicketError};
use crate::pool::{AnalysisTicket, PoolStatus, WorkerPool};
use crate::protocol::{Analysis, Exchange, SearchBudget};
use crate::scheduler::Scheduler;
use crate::worker::{ProcessWorkerFactory, WorkerFactory};

const ENGINE_TARGET: &str = "ponder_engine::engine";

/// Per-request search settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Search budget for each position.
    pub budget: SearchBudget,
    /// Attempt budget per position. 0 and 1 both allow a single attempt.
    pub retries: u32,
}

impl AnalysisOptions {
    /// Derives options from configuration. A configured depth wins over the
    /// move time.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let budget = config.depth().map_or(
            SearchBudget::MoveTime(config.movetime_ms()),
            SearchBudget::Depth,
        );
        Self {
            budget,
            retries: config.retries(),
        }
    }

    /// Replaces the search budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Replaces the attempt budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            budget: SearchBudget::default(),
            retries: ponder_config::DEFAULT_RETRIES,
        }
    }
}

/// Pool of engine processes answering position analysis requests.
///
/// ```no_run
/// use ponder_engine::{AnalysisEngine, AnalysisOptions, ProcessWorkerFactory, EngineCommand};
///
/// let factory = ProcessWorkerFactory::new(EngineCommand::new("stockfish"));
/// let engine = AnalysisEngine::create(&factory, 4)?;
/// engine.new_game();
/// let ticket = engine.analyze_fen("8/8/8/8/8/8/8/K6k w - - 0 1", AnalysisOptions::default());
/// println!("{:?}", ticket.wait()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct AnalysisEngine {
    scheduler: Scheduler,
    defaults: AnalysisOptions,
}

impl AnalysisEngine {
    /// Starts a pool of `workers` engines, capped at the recommended maximum.
    ///
    /// # Errors
    ///
    /// Returns a construction error when a worker cannot be started or none
    /// completes its handshake.
    pub fn create(factory: &dyn WorkerFactory, workers: usize) -> Result<Self, EngineError> {
        WorkerPool::initialize(factory, workers).map(Self::from_pool)
    }

    /// Starts a pool of process-backed workers as configured.
    ///
    /// # Errors
    ///
    /// See [`AnalysisEngine::create`].
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let factory = ProcessWorkerFactory::from_config(config);
        let engine = Self::create(&factory, config.workers())?;
        info!(
            target: ENGINE_TARGET,
            engine = %config.engine_path(),
            workers = engine.size(),
            "analysis engine ready"
        );
        Ok(engine.with_default_options(AnalysisOptions::from_config(config)))
    }

    /// Wraps an already initialised pool.
    #[must_use]
    pub fn from_pool(pool: WorkerPool) -> Self {
        Self {
            scheduler: Scheduler::new(pool),
            defaults: AnalysisOptions::default(),
        }
    }

    /// Replaces the options returned by [`AnalysisEngine::default_options`].
    #[must_use]
    pub const fn with_default_options(mut self, options: AnalysisOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Options derived at construction, for callers without their own.
    #[must_use]
    pub const fn default_options(&self) -> AnalysisOptions {
        self.defaults
    }

    /// Starts a new game on every worker. Blocks until each reset has run;
    /// failures are logged and otherwise ignored.
    pub fn new_game(&self) {
        self.scheduler.pool().reset_all();
    }

    /// Submits one position. The FEN string is passed through unvalidated.
    pub fn analyze_fen(&self, fen: &str, options: AnalysisOptions) -> AnalysisTicket {
        self.scheduler
            .submit(Exchange::search(fen, options.budget), options.retries)
    }

    /// Analyses every position and returns the outcomes in input order.
    ///
    /// All positions are submitted before any result is awaited, so they
    /// spread across the pool. A position whose job was abandoned yields
    /// `None`.
    pub fn analyze_positions<I, S>(&self, fens: I, options: AnalysisOptions) -> Vec<Option<Analysis>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tickets: Vec<AnalysisTicket> = fens
            .into_iter()
            .map(|fen| self.analyze_fen(fen.as_ref(), options))
            .collect();
        tickets
            .into_iter()
            .map(|ticket| match ticket.wait() {
                Ok(outcome) => outcome,
                Err(TicketError::Abandoned | TicketError::TimedOut { .. }) => None,
            })
            .collect()
    }

    /// Stops every worker. Queued jobs are abandoned.
    pub fn terminate(&self) {
        self.scheduler.pool().terminate_all();
    }

    /// Number of usable workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.scheduler.pool().size()
    }

    /// Current idle, busy and queued counts.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.scheduler.pool().status()
    }
}

#[cfg(test)]
mod tests;
