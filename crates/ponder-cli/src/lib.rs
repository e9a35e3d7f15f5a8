//! Command-line runtime for the ponder analysis dispatcher.
//!
//! Positions come from the command line or, when none are given, from
//! standard input one FEN per line. Every position is analysed by the engine
//! pool and reported on standard output as one JSON line, in input order.
//! Positions without a usable analysis print `null`.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use ponder_config::Config;
use ponder_engine::{Analysis, AnalysisEngine, EngineError};
use tracing::{info, warn};

mod config;
mod errors;
pub mod telemetry;

use config::{ConfigLoader, OrthoConfigLoader, split_arguments};
use errors::AppError;

const CLI_TARGET: &str = "ponder_cli";

/// Positional arguments and informational flags. Configuration flags are
/// handled by `ponder-config`.
#[derive(Debug, Parser)]
#[command(
    name = "ponder",
    version,
    about = "Analyse chess positions across a pool of engine processes",
    after_help = "Configuration flags: --config-path, --engine-path, --engine-args, \
                  --workers, --movetime-ms, --depth, --retries, --exchange-timeout-ms, \
                  --log-filter, --log-format"
)]
struct Cli {
    /// Positions to analyse, in FEN. Read from standard input when omitted.
    #[arg(value_name = "FEN")]
    positions: Vec<String>,
}

/// Starts the engine pool for a loaded configuration.
pub(crate) trait EngineLauncher {
    fn launch(&self, config: &Config) -> Result<AnalysisEngine, EngineError>;
}

struct ProcessLauncher;

impl EngineLauncher for ProcessLauncher {
    fn launch(&self, config: &Config) -> Result<AnalysisEngine, EngineError> {
        AnalysisEngine::from_config(config)
    }
}

/// Runs the CLI with the provided arguments and streams.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    run_with(args, stdin, stdout, stderr, &OrthoConfigLoader, &ProcessLauncher)
}

pub(crate) fn run_with<I, R, W, E>(
    args: I,
    stdin: &mut R,
    stdout: &mut W,
    stderr: &mut E,
    loader: &dyn ConfigLoader,
    launcher: &dyn EngineLauncher,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&args);

    let cli = match Cli::try_parse_from(&split.cli_arguments) {
        Ok(cli) => cli,
        Err(error) => return report_usage(error, stdout, stderr),
    };

    match analyse(cli, &split.config_arguments, stdin, stdout, loader, launcher) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(stderr, &format!("ponder: {error}\n"));
            ExitCode::FAILURE
        }
    }
}

fn report_usage<W: Write, E: Write>(error: clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            report(stdout, &error.render().to_string());
            ExitCode::SUCCESS
        }
        _ => {
            report(stderr, &AppError::CliUsage(error).to_string());
            ExitCode::from(2)
        }
    }
}

fn report<W: Write>(sink: &mut W, message: &str) {
    if let Err(error) = sink.write_all(message.as_bytes()) {
        warn!(target: CLI_TARGET, error = %error, "failed to write message");
    }
}

fn analyse<R: BufRead, W: Write>(
    cli: Cli,
    config_arguments: &[OsString],
    stdin: &mut R,
    stdout: &mut W,
    loader: &dyn ConfigLoader,
    launcher: &dyn EngineLauncher,
) -> Result<(), AppError> {
    let config = loader.load(config_arguments)?;
    telemetry::initialise(&config)?;

    let positions = if cli.positions.is_empty() {
        read_positions(stdin)?
    } else {
        cli.positions
    };

    let engine = launcher.launch(&config)?;
    engine.new_game();
    info!(
        target: CLI_TARGET,
        positions = positions.len(),
        workers = engine.size(),
        "analysing positions"
    );
    let outcomes = engine.analyze_positions(&positions, engine.default_options());
    engine.terminate();

    write_outcomes(&outcomes, stdout)
}

/// Reads one FEN per line, skipping blank lines.
fn read_positions<R: BufRead>(stdin: &mut R) -> Result<Vec<String>, AppError> {
    let mut positions = Vec::new();
    for read in stdin.lines() {
        let line = read.map_err(AppError::ReadPositions)?;
        let fen = line.trim();
        if !fen.is_empty() {
            positions.push(fen.to_owned());
        }
    }
    Ok(positions)
}

fn write_outcomes<W: Write>(outcomes: &[Option<Analysis>], stdout: &mut W) -> Result<(), AppError> {
    for outcome in outcomes {
        let line = serde_json::to_string(outcome).map_err(AppError::SerialiseAnalysis)?;
        writeln!(stdout, "{line}").map_err(AppError::WriteOutput)?;
    }
    stdout.flush().map_err(AppError::WriteOutput)
}
