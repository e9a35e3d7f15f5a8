//! Engine worker handles.
//!
//! A worker owns exactly one external analysis process. The pool only ever
//! talks to it through [`EngineWorker`], so tests can substitute scripted
//! workers for real processes. [`WorkerFactory`] is the construction seam used
//! during pool initialisation.

mod process;
mod transport;

pub use process::{EngineCommand, ProcessEngine, ProcessWorkerFactory};
pub use transport::LineTransport;

use crate::error::EngineError;
use crate::protocol::Exchange;

/// One long-lived analysis process.
pub trait EngineWorker: Send + Sync {
    /// Writes the exchange's commands in order and collects output until the
    /// terminator line, which is included in the returned lines.
    ///
    /// Blocks the calling thread only; other workers keep running.
    ///
    /// # Errors
    ///
    /// Returns a process error when the engine exits, its stream closes, or
    /// the exchange times out before the terminator appears. Only a timed-out
    /// handle may run another exchange; after any other failure (see
    /// [`EngineError::retires_worker`]) the pool stops the worker and leaves
    /// it out.
    fn run_exchange(&self, exchange: &Exchange) -> Result<Vec<String>, EngineError>;

    /// Stops the underlying process. Safe to call repeatedly and on a
    /// process that has already gone away.
    fn terminate(&self);
}

/// Builds workers during pool initialisation.
pub trait WorkerFactory: Send + Sync {
    /// Starts the worker with the given pool index.
    ///
    /// # Errors
    ///
    /// Returns a construction error when the process cannot be started.
    fn spawn(&self, index: usize) -> Result<Box<dyn EngineWorker>, EngineError>;
}
