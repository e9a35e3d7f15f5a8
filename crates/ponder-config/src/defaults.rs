use std::num::NonZeroUsize;
use std::thread;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Engine binary launched when no path is configured.
pub const DEFAULT_ENGINE_PATH: &str = "stockfish";

/// Search time budget per position when no depth is configured.
pub const DEFAULT_MOVETIME_MS: u64 = 2_000;

/// Attempts granted to a job before it resolves without a result.
pub const DEFAULT_RETRIES: u32 = 2;

/// Upper bound on concurrently running engine processes.
///
/// Engines are CPU bound and each one already searches with its own threads,
/// so the pool never grows past this even on large hosts.
pub const MAX_RECOMMENDED_WORKERS: usize = 8;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default engine binary.
pub fn default_engine_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_ENGINE_PATH)
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Number of engine workers this host can usefully run at once.
///
/// Derived from the available parallelism and clamped to
/// `1..=MAX_RECOMMENDED_WORKERS`.
pub fn recommended_workers() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .clamp(1, MAX_RECOMMENDED_WORKERS)
}
