//! Jobs and the tickets callers wait on.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use tracing::debug;

use crate::error::TicketError;
use crate::protocol::{Analysis, Exchange};

const JOB_TARGET: &str = "ponder_engine::job";

/// One analysis request awaiting or undergoing execution.
///
/// Owned by exactly one place at a time: the pending queue, a worker's inbox,
/// or the thread running it. Dropping an unresolved job abandons it.
pub(crate) struct Job {
    id: u64,
    exchange: Exchange,
    retries: u32,
    attempt: u32,
    result: SyncSender<Option<Analysis>>,
}

impl Job {
    /// Creates a job on its first attempt together with the caller's ticket.
    pub(crate) fn new(id: u64, exchange: Exchange, retries: u32) -> (Self, AnalysisTicket) {
        let (result, receiver) = mpsc::sync_channel(1);
        let job = Self {
            id,
            exchange,
            retries,
            attempt: 1,
            result,
        };
        (job, AnalysisTicket { id, receiver })
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) const fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub(crate) const fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) const fn retries(&self) -> u32 {
        self.retries
    }

    /// Moves to the next attempt if the budget allows it.
    pub(crate) fn advance_attempt(&mut self) -> bool {
        if self.attempt < self.retries {
            self.attempt += 1;
            true
        } else {
            false
        }
    }

    /// Fires the caller's result. Consumes the job so it fires at most once.
    pub(crate) fn resolve(self, outcome: Option<Analysis>) {
        if self.result.send(outcome).is_err() {
            debug!(target: JOB_TARGET, job = self.id, "caller dropped its ticket before the result");
        }
    }
}

/// Handle on the eventual outcome of a submitted analysis.
///
/// The outcome is `Some` for a parsed search and `None` when the engine gave
/// no best move or the job ran out of attempts. A ticket yields its outcome
/// once.
#[derive(Debug)]
pub struct AnalysisTicket {
    id: u64,
    receiver: Receiver<Option<Analysis>>,
}

impl AnalysisTicket {
    /// Identifier of the underlying job, as it appears in logs.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the job resolves.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Abandoned`] if the pool terminated before the
    /// job resolved.
    pub fn wait(self) -> Result<Option<Analysis>, TicketError> {
        self.receiver.recv().map_err(|_| TicketError::Abandoned)
    }

    /// Blocks until the job resolves or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::TimedOut`] when the wait expires (the job keeps
    /// running and may be waited on again) and [`TicketError::Abandoned`] if
    /// the pool terminated first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<Analysis>, TicketError> {
        self.receiver
            .recv_timeout(timeout)
            .map_err(|error| match error {
                RecvTimeoutError::Timeout => TicketError::TimedOut {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                },
                RecvTimeoutError::Disconnected => TicketError::Abandoned,
            })
    }
}
