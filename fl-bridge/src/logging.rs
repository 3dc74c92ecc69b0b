//! This module sets up `tracing`.
//!
//! Everything goes to stdout at `INFO` (or whatever `RUST_LOG` says) and to a daily log file at
//! `DEBUG` (or whatever `FLAG_LIGHTS_LOG` says). The file also records which thread each line
//! came from, since the dispatch loop, fuel logging, and export worker all run on their own.

use std::{env, path::PathBuf};
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};
use tracing_unwrap::ResultExt;

/// The common prefix for the log files.
const LOG_PREFIX: &str = "flag-lights.log";

/// The variable holding the filter directives for the log file.
const FILE_FILTER_VAR: &str = "FLAG_LIGHTS_LOG";

/// The directory for the log files, which is `logs` inside `FLAG_LIGHTS_DATA_DIR`, or inside
/// the working directory if that isn't set.
pub fn log_dir() -> PathBuf {
    env::var_os("FLAG_LIGHTS_DATA_DIR")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("logs")
}

/// Build a filter from an environment variable, falling back to everything at `default` and above.
fn filter_from_env(var: &str, default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(var)
        .from_env_lossy()
}

/// Initialise a subscriber for tracing to log to `stdout` and a file.
///
/// The returned guard must be kept alive for as long as logs should be written to the file.
pub fn init_tracing() -> WorkerGuard {
    let dir = log_dir();
    let (appender, guard) = non_blocking(rolling::daily(&dir, LOG_PREFIX));

    let file_layer = fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_thread_names(true)
        .with_filter(filter_from_env(FILE_FILTER_VAR, LevelFilter::DEBUG));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(filter_from_env(EnvFilter::DEFAULT_ENV, LevelFilter::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .expect_or_log("Tracing should only be initialised once");

    info!(dir = %dir.display(), "Logging to file");
    guard
}
