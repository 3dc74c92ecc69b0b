//! This module handles writing the fuel usage log to a JSON file in the background.

use crate::{
    cancel::{cancel_signal, CancelToken, LoopHandle},
    fuel::{self, FuelUsageLog},
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use tracing_unwrap::ResultExt;

/// An error from writing an export.
#[derive(Debug, Error)]
#[allow(missing_docs, reason = "the #[error] attributes document the variants")]
pub enum ExportError {
    #[error("IO error: `{0:?}`")]
    Io(#[from] io::Error),

    #[error("Error serializing export: {0}")]
    Json(#[from] serde_json::Error),
}

/// How often the export worker writes the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportSchedule {
    /// Write once, one interval after the worker starts.
    #[default]
    OneShot,

    /// Write every interval until stopped.
    Repeat,
}

/// The settings for the export worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Should the binary start the export worker?
    pub enabled: bool,

    /// The file to write. It gets overwritten each time.
    pub path: PathBuf,

    /// How long to wait before each export.
    pub interval_secs: u64,

    /// Whether to export once or keep going.
    pub schedule: ExportSchedule,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("telemetry_export.json"),
            interval_secs: 300,
            schedule: ExportSchedule::OneShot,
        }
    }
}

impl ExportConfig {
    /// The interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// What gets written to the export file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryExport {
    /// When this export was made.
    pub exported_at: DateTime<Local>,

    /// The mean fuel use, if there are any readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_fuel_use_per_hour: Option<f32>,

    /// Every fuel use reading, in kilograms per hour.
    pub fuel_use_per_hour: Vec<f32>,
}

impl TelemetryExport {
    /// Take a snapshot of the log.
    pub fn from_log(log: &FuelUsageLog) -> Self {
        let fuel_use_per_hour = log.snapshot();
        Self {
            exported_at: Local::now(),
            average_fuel_use_per_hour: fuel::average(&fuel_use_per_hour),
            fuel_use_per_hour,
        }
    }
}

/// Write the current contents of the log to a file as pretty JSON.
#[instrument(skip(log))]
pub fn write_export(path: &Path, log: &FuelUsageLog) -> Result<(), ExportError> {
    let export = TelemetryExport::from_log(log);
    fs::write(path, serde_json::to_string_pretty(&export)?)?;
    info!(
        readings = export.fuel_use_per_hour.len(),
        "Exported fuel usage"
    );
    Ok(())
}

/// Start a thread which waits for the interval and then writes the export, according to the
/// schedule. Cancelling it during the wait means nothing more gets written.
pub fn spawn_export_worker(config: ExportConfig, log: Arc<FuelUsageLog>) -> LoopHandle {
    let (signal, token) = cancel_signal();
    let thread = thread::Builder::new()
        .name("export-worker".to_string())
        .spawn(move || run_export_worker(config, log, token))
        .expect_or_log("Should be able to spawn the export worker thread");
    LoopHandle::new(signal, thread)
}

/// The body of the export worker thread.
#[instrument(skip_all, fields(path = ?config.path, schedule = ?config.schedule))]
fn run_export_worker(config: ExportConfig, log: Arc<FuelUsageLog>, mut token: CancelToken) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_log();

    info!(interval = ?config.interval(), "Starting export worker");

    runtime.block_on(async move {
        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("Export worker cancelled");
                    return;
                }

                _ = tokio::time::sleep(config.interval()) => {}
            }

            if let Err(error) = write_export(&config.path, &log) {
                error!(%error, "Failed to export fuel usage");
            }

            if config.schedule == ExportSchedule::OneShot {
                debug!("One-shot export finished");
                return;
            }
        }
    });
}
