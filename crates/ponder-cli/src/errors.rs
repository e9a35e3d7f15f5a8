//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use ponder_engine::EngineError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to start analysis engines: {0}")]
    StartEngine(#[from] EngineError),
    #[error("failed to read positions: {0}")]
    ReadPositions(io::Error),
    #[error("failed to serialise analysis: {0}")]
    SerialiseAnalysis(serde_json::Error),
    #[error("failed to write analysis: {0}")]
    WriteOutput(io::Error),
}
