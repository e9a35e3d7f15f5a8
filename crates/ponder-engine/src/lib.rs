//! Dispatch of position analysis across a pool of external engine processes.
//!
//! Each worker owns one long-lived engine process that speaks a line
//! protocol: commands go in on stdin, free-form lines come back on stdout,
//! and every exchange ends at a known terminator line. The [`WorkerPool`]
//! keeps one worker per slot, hands each job to exactly one idle worker, and
//! queues the rest in arrival order. The [`Scheduler`] retries failed
//! exchanges by sending the job to the back of the queue until its attempt
//! budget is spent.
//!
//! [`AnalysisEngine`] bundles the pieces for callers that only want answers:
//!
//! - [`AnalysisEngine::new_game`] resets every worker between games.
//! - [`AnalysisEngine::analyze_fen`] submits a position and returns an
//!   [`AnalysisTicket`].
//! - [`AnalysisEngine::analyze_positions`] analyses a batch in input order.

mod engine;
mod error;
pub mod pool;
pub mod protocol;
pub mod scheduler;
pub mod worker;

pub use engine::{AnalysisEngine, AnalysisOptions};
pub use error::{EngineError, TicketError, TransportError};
pub use pool::{AnalysisTicket, PoolStatus, WorkerPool};
pub use protocol::{Analysis, Evaluation, Exchange, SearchBudget, Terminator, parse_analysis};
pub use scheduler::Scheduler;
pub use worker::{EngineCommand, EngineWorker, LineTransport, ProcessEngine, ProcessWorkerFactory, WorkerFactory};

#[cfg(test)]
mod tests;
