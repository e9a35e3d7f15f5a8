//! Engine worker backed by a child process.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use ponder_config::Config;
use tracing::{debug, warn};

use super::transport::LineTransport;
use super::{EngineWorker, WorkerFactory};
use crate::error::{EngineError, TransportError};
use crate::protocol::{Exchange, Terminator};

/// Log target for worker process operations.
const WORKER_TARGET: &str = "ponder_engine::worker";

/// How long a worker may take to honour `quit` before it is killed.
const QUIT_GRACE: Duration = Duration::from_millis(200);
const QUIT_POLL: Duration = Duration::from_millis(10);

/// Describes how to launch an engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<String>,
    exchange_timeout: Option<Duration>,
}

impl EngineCommand {
    /// Launches `program` with no arguments and no exchange timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            exchange_timeout: None,
        }
    }

    /// Derives the command from the engine settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let command = Self::new(config.engine_path().as_std_path()).with_args(config.engine_args());
        match config.exchange_timeout_ms() {
            Some(millis) => command.with_exchange_timeout(Duration::from_millis(millis)),
            None => command,
        }
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Bounds every exchange; expiry counts as a process failure.
    #[must_use]
    pub const fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = Some(timeout);
        self
    }

    /// The executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Per-exchange timeout, if any.
    #[must_use]
    pub const fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout
    }
}

enum ProcessState {
    Running(Child),
    Stopped,
}

struct Channel {
    transport: LineTransport<ChildStdin>,
    /// Set after a timed-out exchange: the engine may still be searching and
    /// its late output must not leak into the next exchange.
    needs_resync: bool,
}

/// A worker that owns one engine child process.
pub struct ProcessEngine {
    index: usize,
    program: String,
    pid: u32,
    exchange_timeout: Option<Duration>,
    state: Mutex<ProcessState>,
    channel: Mutex<Channel>,
}

impl ProcessEngine {
    /// Starts the engine process for pool slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BinaryNotFound`] when the executable does not
    /// exist and [`EngineError::SpawnFailed`] for any other start-up failure.
    pub fn spawn(index: usize, command: &EngineCommand) -> Result<Self, EngineError> {
        let program = command.program().display().to_string();
        debug!(
            target: WORKER_TARGET,
            worker = index,
            command = %program,
            args = ?command.args(),
            "spawning engine process"
        );

        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| {
                if error.kind() == io::ErrorKind::NotFound {
                    EngineError::BinaryNotFound {
                        command: program.clone(),
                        source: Arc::new(error),
                    }
                } else {
                    EngineError::SpawnFailed {
                        message: format!("failed to start {program}"),
                        source: Arc::new(error),
                    }
                }
            })?;

        let transport = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => LineTransport::new(stdout, stdin),
            _ => Err(io::Error::other("engine stdio was not captured")),
        };
        let transport = match transport {
            Ok(transport) => transport,
            Err(error) => {
                reap(index, &mut child);
                return Err(EngineError::SpawnFailed {
                    message: format!("failed to attach to {program}"),
                    source: Arc::new(error),
                });
            }
        };

        let pid = child.id();
        debug!(target: WORKER_TARGET, worker = index, pid, "engine process spawned");

        Ok(Self {
            index,
            program,
            pid,
            exchange_timeout: command.exchange_timeout(),
            state: Mutex::new(ProcessState::Running(child)),
            channel: Mutex::new(Channel {
                transport,
                needs_resync: false,
            }),
        })
    }

    /// Pool slot this worker was started for.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Operating-system process id of the engine.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            ProcessState::Running(_)
        )
    }

    /// Aborts any search still in progress and skips its output.
    fn resync(&self, channel: &mut Channel) -> Result<(), EngineError> {
        let sync = Exchange::new(["stop", "isready"], Terminator::ready());
        let discarded = channel.transport.exchange(&sync, self.exchange_timeout)?;
        channel.needs_resync = false;
        debug!(
            target: WORKER_TARGET,
            worker = self.index,
            discarded = discarded.len(),
            "resynchronised engine after timeout"
        );
        Ok(())
    }

    fn classify(&self, error: TransportError) -> EngineError {
        match error {
            TransportError::Closed if self.is_running() => EngineError::ProcessExited,
            TransportError::Closed => EngineError::Terminated,
            other => EngineError::Transport(other),
        }
    }
}

impl EngineWorker for ProcessEngine {
    fn run_exchange(&self, exchange: &Exchange) -> Result<Vec<String>, EngineError> {
        if !self.is_running() {
            return Err(EngineError::Terminated);
        }

        let mut channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        if channel.needs_resync {
            self.resync(&mut channel)?;
        }

        match channel.transport.exchange(exchange, self.exchange_timeout) {
            Ok(lines) => Ok(lines),
            Err(error) => {
                if matches!(error, TransportError::TimedOut { .. }) {
                    channel.needs_resync = true;
                }
                warn!(
                    target: WORKER_TARGET,
                    worker = self.index,
                    pid = self.pid,
                    error = %error,
                    "engine exchange failed"
                );
                Err(self.classify(error))
            }
        }
    }

    fn terminate(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, ProcessState::Stopped)
        };
        let ProcessState::Running(mut child) = previous else {
            return;
        };

        // An exchange in flight holds the channel; killing the process will
        // close its output and fail that exchange.
        if let Ok(mut channel) = self.channel.try_lock() {
            if let Err(error) = channel.transport.send("quit") {
                debug!(target: WORKER_TARGET, worker = self.index, error = %error, "quit not delivered");
            }
        }

        reap(self.index, &mut child);
    }
}

/// Waits briefly for the process to exit, then kills it.
fn reap(index: usize, child: &mut Child) {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: WORKER_TARGET, worker = index, ?status, "engine process exited");
                return;
            }
            Ok(None) if started.elapsed() < QUIT_GRACE => thread::sleep(QUIT_POLL),
            Ok(None) | Err(_) => break,
        }
    }

    warn!(
        target: WORKER_TARGET,
        worker = index,
        "engine did not exit gracefully, killing it"
    );
    if let Err(error) = child.kill() {
        debug!(target: WORKER_TARGET, worker = index, error = %error, "kill failed");
    }
    if let Err(error) = child.wait() {
        debug!(target: WORKER_TARGET, worker = index, error = %error, "wait failed");
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("index", &self.index)
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Starts one [`ProcessEngine`] per pool slot from a shared command.
#[derive(Debug, Clone)]
pub struct ProcessWorkerFactory {
    command: EngineCommand,
}

impl ProcessWorkerFactory {
    /// Creates a factory launching `command` for every worker.
    #[must_use]
    pub const fn new(command: EngineCommand) -> Self {
        Self { command }
    }

    /// Creates a factory from the engine settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(EngineCommand::from_config(config))
    }

    /// The command launched for each worker.
    #[must_use]
    pub const fn command(&self) -> &EngineCommand {
        &self.command
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    fn spawn(&self, index: usize) -> Result<Box<dyn EngineWorker>, EngineError> {
        Ok(Box::new(ProcessEngine::spawn(index, &self.command)?))
    }
}
