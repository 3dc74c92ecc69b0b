//! This module provides [`BridgeConfig`], which is loaded from a RON file at startup.

use crate::{
    export::ExportConfig,
    policy::{ColourPolicy, ModeIndices},
};
use fl_telemetry::{ReplaySource, TelemetryError, TelemetrySource};
use serde::{Deserialize, Serialize};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// The config file to use when `FLAG_LIGHTS_CONFIG` isn't set.
const DEFAULT_CONFIG_FILENAME: &str = "flag_lights.ron";

/// An error from saving the config.
#[derive(Debug, Error)]
#[allow(missing_docs, reason = "the #[error] attributes document the variants")]
pub enum ConfigError {
    #[error("IO error: `{0:?}`")]
    Io(#[from] io::Error),

    #[error("Error serializing config: {0}")]
    Ron(#[from] ron::Error),
}

/// Where to find the OpenRGB server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRgbConfig {
    /// The host name or IP address.
    pub host: String,

    /// The SDK port.
    pub port: u16,
}

impl Default for OpenRgbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6742,
        }
    }
}

/// Where the telemetry comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryConfig {
    /// Play back a RON list of samples.
    Replay {
        /// The file of samples.
        path: PathBuf,

        /// How long to wait between samples, in milliseconds.
        tick_ms: u64,
    },

    /// Read the running simulator. Needs the `iracing` feature on Windows.
    Iracing,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        if cfg!(all(windows, feature = "iracing")) {
            Self::Iracing
        } else {
            Self::Replay {
                path: PathBuf::from("demos/replay.ron"),
                tick_ms: 500,
            }
        }
    }
}

impl TelemetryConfig {
    /// Open the configured source.
    pub fn open(&self) -> Result<Arc<dyn TelemetrySource>, TelemetryError> {
        match self {
            Self::Replay { path, tick_ms } => Ok(Arc::new(ReplaySource::from_file(
                path,
                Duration::from_millis(*tick_ms),
            )?)),
            Self::Iracing => iracing_source(),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(windows, feature = "iracing"))] {
        fn iracing_source() -> Result<Arc<dyn TelemetrySource>, TelemetryError> {
            Ok(Arc::new(fl_telemetry::IracingSource::new()))
        }
    } else {
        fn iracing_source() -> Result<Arc<dyn TelemetrySource>, TelemetryError> {
            Err(TelemetryError::Unavailable(
                "iRacing telemetry needs Windows and the `iracing` feature",
            ))
        }
    }
}

/// Everything that can be configured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// The name we give ourselves when connecting to OpenRGB.
    pub client_name: String,

    /// The OpenRGB server.
    pub openrgb: OpenRgbConfig,

    /// The telemetry source.
    pub telemetry: TelemetryConfig,

    /// How telemetry turns into colours.
    pub policy: ColourPolicy,

    /// Which device modes to use.
    pub modes: ModeIndices,

    /// Should fuel use be logged?
    pub fuel_logging: bool,

    /// The fuel usage export.
    pub export: ExportConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: "IRacing RGB Client".to_string(),
            openrgb: OpenRgbConfig::default(),
            telemetry: TelemetryConfig::default(),
            policy: ColourPolicy::default(),
            modes: ModeIndices::default(),
            fuel_logging: false,
            export: ExportConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// The path of the config file, from `FLAG_LIGHTS_CONFIG` or the working directory.
    pub fn config_path() -> PathBuf {
        env::var_os("FLAG_LIGHTS_CONFIG")
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME), PathBuf::from)
    }

    /// Load the config from the given file. If the file can't be read or parsed, then the
    /// default config gets written to it and returned.
    #[instrument]
    pub fn from_file(path: &Path) -> Self {
        let write_and_return_default = || -> Self {
            let default = Self::default();
            if let Err(error) = default.save_to_file(path) {
                warn!(%error, "Unable to write default config");
            }
            default
        };

        let Ok(text) = fs::read_to_string(path) else {
            info!("No config file found; using the default");
            return write_and_return_default();
        };

        ron::from_str(&text).unwrap_or_else(|error| {
            warn!(%error, "Invalid config file; replacing it with the default");
            write_and_return_default()
        })
    }

    /// Save the config to the given file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default().struct_names(true),
        )?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportSchedule;

    #[test]
    fn missing_file_writes_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flag_lights.ron");

        let config = BridgeConfig::from_file(&path);
        assert_eq!(config, BridgeConfig::default());
        assert!(path.exists());

        // The written default must load back as itself
        assert_eq!(BridgeConfig::from_file(&path), config);
    }

    #[test]
    fn invalid_file_is_replaced_with_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flag_lights.ron");
        fs::write(&path, "this is not a config").unwrap();

        assert_eq!(BridgeConfig::from_file(&path), BridgeConfig::default());
        assert_ne!(fs::read_to_string(&path).unwrap(), "this is not a config");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flag_lights.ron");
        fs::write(
            &path,
            r#"BridgeConfig(
                client_name: "Rig",
                openrgb: (port: 1234),
                telemetry: Replay(path: "laps.ron", tick_ms: 16),
                fuel_logging: true,
                export: (enabled: true, schedule: Repeat),
            )"#,
        )
        .unwrap();

        let config = BridgeConfig::from_file(&path);
        assert_eq!(config.client_name, "Rig");
        assert_eq!(config.openrgb.host, "127.0.0.1");
        assert_eq!(config.openrgb.port, 1234);
        assert_eq!(
            config.telemetry,
            TelemetryConfig::Replay {
                path: PathBuf::from("laps.ron"),
                tick_ms: 16
            }
        );
        assert!(config.fuel_logging);
        assert!(config.export.enabled);
        assert_eq!(config.export.interval_secs, 300);
        assert_eq!(config.export.schedule, ExportSchedule::Repeat);
        assert_eq!(config.policy, ColourPolicy::default_flag_table());
        assert_eq!(config.modes, ModeIndices::default());
    }

    #[cfg(not(all(windows, feature = "iracing")))]
    #[test]
    fn default_replay_is_the_shipped_demo() {
        let TelemetryConfig::Replay { path, .. } = TelemetryConfig::default() else {
            panic!("Default telemetry should be a replay");
        };
        assert_eq!(path, PathBuf::from("demos/replay.ron"));

        // Paths are relative to the workspace root, where the binary is run from
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(&path);
        let source = TelemetryConfig::Replay {
            path: shipped,
            tick_ms: 0,
        }
        .open()
        .unwrap();
        assert!(source.is_connected());
    }

    #[test]
    fn open_replay_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.ron");
        fs::write(&path, r#"[(session_flags: "GREEN"), (session_flags: "BLUE")]"#).unwrap();

        let source = TelemetryConfig::Replay {
            path: path.clone(),
            tick_ms: 0,
        }
        .open()
        .unwrap();
        assert!(source.is_connected());
        assert_eq!(source.data_feed().unwrap().take(3).count(), 3);

        let missing = TelemetryConfig::Replay {
            path: dir.path().join("missing.ron"),
            tick_ms: 0,
        };
        assert!(matches!(missing.open(), Err(TelemetryError::Io(_))));
    }

    #[cfg(not(all(windows, feature = "iracing")))]
    #[test]
    fn iracing_needs_windows() {
        assert!(matches!(
            TelemetryConfig::Iracing.open(),
            Err(TelemetryError::Unavailable(_))
        ));
    }

    #[test]
    fn default_config_test() {
        let config = BridgeConfig::default();
        assert_eq!(config.client_name, "IRacing RGB Client");
        assert_eq!(config.openrgb.port, 6742);
        assert!(!config.fuel_logging);
        assert!(!config.export.enabled);
    }
}
