//! This crate connects simulator telemetry to RGB lighting. The [`Bridge`] owns a
//! [`TelemetrySource`](fl_telemetry::TelemetrySource) and a
//! [`LightingDriver`](fl_driver_trait::LightingDriver), and uses a [`ColourPolicy`] to decide
//! what the lights should look like for each sample.

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod fuel;
pub mod logging;
pub mod policy;

pub use self::{
    bridge::Bridge,
    config::{BridgeConfig, TelemetryConfig},
    dispatch::Dispatcher,
    export::{ExportConfig, ExportSchedule},
    fuel::FuelUsageLog,
    policy::{ColourPolicy, Fill, Look, ModeChoice, ModeIndices},
};
