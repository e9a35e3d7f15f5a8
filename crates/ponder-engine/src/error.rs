//! Error types for engine workers, the pool, and analysis tickets.
//!
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while constructing or driving an engine worker.
///
/// Construction failures abort pool initialisation. Every other variant is a
/// process failure: the exchange did not complete and the job goes back
/// through the scheduler's retry path. A process failure that leaves the
/// handle unusable also takes the worker out of the pool.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine executable was not found.
    #[error("analysis engine binary not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The engine process could not be started.
    #[error("failed to spawn analysis engine: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The dedicated thread for a worker could not be started.
    #[error("failed to start thread for worker {worker}")]
    WorkerThread {
        /// Index of the worker whose thread failed to start.
        worker: usize,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Every worker failed its handshake.
    #[error("none of the {requested} engine workers completed the handshake")]
    NoUsableWorkers {
        /// Number of workers that were started.
        requested: usize,
    },

    /// The engine process exited while an exchange was in flight.
    #[error("analysis engine process exited unexpectedly")]
    ProcessExited,

    /// The worker was terminated and no longer accepts exchanges.
    #[error("analysis engine worker has been terminated")]
    Terminated,

    /// Line transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl EngineError {
    /// Returns `true` when the error prevented a worker from being built.
    #[must_use]
    pub const fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound { .. }
                | Self::SpawnFailed { .. }
                | Self::WorkerThread { .. }
                | Self::NoUsableWorkers { .. }
        )
    }

    /// Returns `true` when an exchange failed on an otherwise built worker.
    #[must_use]
    pub const fn is_process_error(&self) -> bool {
        !self.is_construction_error()
    }

    /// Returns `true` when the worker that raised this error cannot run
    /// another exchange.
    ///
    /// A timed-out worker resynchronises before its next exchange and stays
    /// usable; a dead process or a broken stream does not.
    #[must_use]
    pub const fn retires_worker(&self) -> bool {
        matches!(
            self,
            Self::ProcessExited
                | Self::Terminated
                | Self::Transport(TransportError::Closed | TransportError::Io(_))
        )
    }
}

/// Errors raised by the line transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error while writing a command.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The output stream ended before the terminator line arrived.
    #[error("output stream closed before the exchange completed")]
    Closed,

    /// The terminator line did not arrive in time.
    #[error("exchange timed out after {timeout_ms}ms")]
    TimedOut {
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// Reasons an [`AnalysisTicket`](crate::AnalysisTicket) produced no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketError {
    /// The job was discarded because the pool terminated or lost every
    /// worker; it will never resolve.
    #[error("analysis job was abandoned before it resolved")]
    Abandoned,

    /// The job did not resolve within the caller's wait limit.
    #[error("analysis job did not resolve within {timeout_ms}ms")]
    TimedOut {
        /// The wait limit, in milliseconds.
        timeout_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn io_error() -> Arc<io::Error> {
        Arc::new(io::Error::other("boom"))
    }

    #[rstest]
    #[case(EngineError::BinaryNotFound { command: String::from("fish"), source: io_error() }, true)]
    #[case(EngineError::SpawnFailed { message: String::from("denied"), source: io_error() }, true)]
    #[case(EngineError::NoUsableWorkers { requested: 2 }, true)]
    #[case(EngineError::ProcessExited, false)]
    #[case(EngineError::Terminated, false)]
    #[case(EngineError::Transport(TransportError::Closed), false)]
    fn classifies_construction_errors(#[case] error: EngineError, #[case] construction: bool) {
        assert_eq!(error.is_construction_error(), construction);
        assert_eq!(error.is_process_error(), !construction);
    }

    #[rstest]
    #[case(EngineError::ProcessExited, true)]
    #[case(EngineError::Terminated, true)]
    #[case(EngineError::Transport(TransportError::Closed), true)]
    #[case(EngineError::Transport(TransportError::Io(io_error())), true)]
    #[case(EngineError::Transport(TransportError::TimedOut { timeout_ms: 10 }), false)]
    #[case(EngineError::NoUsableWorkers { requested: 1 }, false)]
    fn dead_handles_retire_their_worker(#[case] error: EngineError, #[case] retires: bool) {
        assert_eq!(error.retires_worker(), retires);
    }

    #[test]
    fn transport_timeout_reports_duration() {
        let error = EngineError::from(TransportError::TimedOut { timeout_ms: 250 });
        assert_eq!(error.to_string(), "transport error: exchange timed out after 250ms");
    }
}
