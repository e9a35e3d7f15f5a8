//! Line-oriented stdio transport.
//!
//! Output is read on a dedicated thread and forwarded over a channel so an
//! exchange can wait with a deadline, and so terminating the process (which
//! closes stdout) wakes a blocked exchange instead of leaving it stuck in a
//! read.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::TransportError;
use crate::protocol::Exchange;

const TRANSPORT_TARGET: &str = "ponder_engine::transport";

/// Writes command lines to an engine and reads its output lines.
pub struct LineTransport<W: Write> {
    writer: BufWriter<W>,
    lines: Receiver<String>,
}

impl<W: Write> LineTransport<W> {
    /// Creates a transport over the engine's output and input streams.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the reader thread cannot be started.
    pub fn new<R>(reader: R, writer: W) -> Result<Self, std::io::Error>
    where
        R: Read + Send + 'static,
    {
        let (sender, lines) = mpsc::channel();
        thread::Builder::new()
            .name(String::from("ponder-engine-stdout"))
            .spawn(move || {
                for read in BufReader::new(reader).lines() {
                    let Ok(line) = read else { break };
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                trace!(target: TRANSPORT_TARGET, "engine output stream closed");
            })?;

        Ok(Self {
            writer: BufWriter::new(writer),
            lines,
        })
    }

    /// Writes one command followed by a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if writing to the engine fails.
    pub fn send(&mut self, command: &str) -> Result<(), TransportError> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Runs one exchange: sends every command, then gathers output lines up
    /// to and including the terminator.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the output ends first,
    /// `TransportError::TimedOut` if `timeout` elapses first, or
    /// `TransportError::Io` if a command cannot be written.
    pub fn exchange(
        &mut self,
        exchange: &Exchange,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, TransportError> {
        for command in exchange.commands() {
            trace!(target: TRANSPORT_TARGET, command = %command, "sending command");
            self.send(command)?;
        }

        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut collected = Vec::new();
        loop {
            let line = self.next_line(deadline)?;
            let done = exchange.terminator().matches(&line);
            collected.push(line);
            if done {
                return Ok(collected);
            }
        }
    }

    fn next_line(&self, deadline: Option<(Instant, Duration)>) -> Result<String, TransportError> {
        let Some((deadline, limit)) = deadline else {
            return self.lines.recv().map_err(|_| TransportError::Closed);
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.lines.recv_timeout(remaining).map_err(|error| match error {
            RecvTimeoutError::Timeout => TransportError::TimedOut {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }

    #[cfg(test)]
    pub(crate) fn written(&self) -> &W {
        self.writer.get_ref()
    }
}
