//! Shared configuration for the ponder analysis dispatcher.
//!
//! Configuration is layered with `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `PONDER_CONFIG_PATH`), then
//! `PONDER_*` environment variables, and finally command-line flags. The
//! resulting [`Config`] describes which engine binary the worker pool
//! launches, how many workers it asks for, the default search budget and
//! retry allowance, and how the binaries emit structured logs.

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_ENGINE_PATH, DEFAULT_LOG_FILTER, DEFAULT_MOVETIME_MS, DEFAULT_RETRIES,
    MAX_RECOMMENDED_WORKERS, default_engine_path, default_log_filter, default_log_filter_string,
    default_log_format, recommended_workers,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration shared by the engine pool and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PONDER")]
pub struct Config {
    /// Executable of the line-protocol analysis engine.
    #[ortho_config(default = default_engine_path())]
    pub engine_path: Utf8PathBuf,
    /// Extra arguments passed to the engine executable.
    #[ortho_config(default = Vec::new())]
    pub engine_args: Vec<String>,
    /// Requested number of engine workers; capped at the host recommendation.
    #[ortho_config(default = recommended_workers())]
    pub workers: usize,
    /// Search time per position in milliseconds.
    #[ortho_config(default = DEFAULT_MOVETIME_MS)]
    pub movetime_ms: u64,
    /// Fixed search depth; takes precedence over `movetime_ms` when set.
    pub depth: Option<u32>,
    /// Attempts granted to each analysis job.
    #[ortho_config(default = DEFAULT_RETRIES)]
    pub retries: u32,
    /// Upper bound on a single engine exchange in milliseconds.
    pub exchange_timeout_ms: Option<u64>,
    /// Tracing filter expression applied to log output.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            engine_args: Vec::new(),
            workers: recommended_workers(),
            movetime_ms: DEFAULT_MOVETIME_MS,
            depth: None,
            retries: DEFAULT_RETRIES,
            exchange_timeout_ms: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Executable launched for every worker.
    #[must_use]
    pub fn engine_path(&self) -> &Utf8Path {
        self.engine_path.as_path()
    }

    /// Arguments passed to the engine executable.
    #[must_use]
    pub fn engine_args(&self) -> &[String] {
        &self.engine_args
    }

    /// Requested worker count before the pool applies its cap.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Default search time per position in milliseconds.
    #[must_use]
    pub const fn movetime_ms(&self) -> u64 {
        self.movetime_ms
    }

    /// Default fixed search depth, if configured.
    #[must_use]
    pub const fn depth(&self) -> Option<u32> {
        self.depth
    }

    /// Default attempt budget per job.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Per-exchange timeout in milliseconds, if configured.
    #[must_use]
    pub const fn exchange_timeout_ms(&self) -> Option<u64> {
        self.exchange_timeout_ms
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_values() {
        let config = Config::default();

        assert_eq!(config.engine_path(), Utf8Path::new("stockfish"));
        assert!(config.engine_args().is_empty());
        assert_eq!(config.workers(), recommended_workers());
        assert_eq!(config.movetime_ms(), 2_000);
        assert_eq!(config.depth(), None);
        assert_eq!(config.retries(), 2);
        assert_eq!(config.exchange_timeout_ms(), None);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
    }
}
