//! CLI entrypoint for the ponder analysis dispatcher.
//!
//! The binary delegates to [`ponder_cli::run`], which loads configuration,
//! starts the engine pool, and writes one JSON line per analysed position.

use std::io::{self, StderrLock, StdinLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'_> = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    ponder_cli::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
