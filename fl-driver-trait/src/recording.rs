//! This module provides a [`RecordingDriver`] which keeps every command it receives.

use crate::{DeviceInfo, DriverError, LightingDriver, ModeRequest, RGBArray};
use std::sync::{Arc, Mutex};
use tracing_unwrap::ResultExt;

/// A command received by a [`RecordingDriver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverCommand {
    /// [`LightingDriver::set_mode`].
    SetMode { device: usize, mode: ModeRequest },

    /// [`LightingDriver::update_leds`].
    UpdateLeds {
        device: usize,
        colours: Vec<RGBArray>,
    },

    /// [`LightingDriver::update_zone_leds`].
    UpdateZoneLeds {
        device: usize,
        zone: usize,
        colours: Vec<RGBArray>,
    },

    /// [`LightingDriver::release`].
    Release,
}

/// A shared handle to the commands a [`RecordingDriver`] has received, which stays readable
/// after the driver has been moved somewhere else.
#[derive(Clone, Debug, Default)]
pub struct CommandLog(Arc<Mutex<Vec<DriverCommand>>>);

impl CommandLog {
    /// Return a copy of every command received so far.
    pub fn commands(&self) -> Vec<DriverCommand> {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the command log")
            .clone()
    }

    /// Remove every command received so far and return them.
    pub fn take(&self) -> Vec<DriverCommand> {
        std::mem::take(
            &mut *self
                .0
                .lock()
                .expect_or_log("Should be able to lock the command log"),
        )
    }

    /// How many commands have been received.
    pub fn len(&self) -> usize {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the command log")
            .len()
    }

    /// Have no commands been received?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a command.
    fn push(&self, command: DriverCommand) {
        self.0
            .lock()
            .expect_or_log("Should be able to lock the command log")
            .push(command);
    }
}

/// A driver that just records every command it gets into a [`CommandLog`].
#[derive(Debug)]
pub struct RecordingDriver {
    /// The fake devices.
    devices: Vec<DeviceInfo>,

    /// Where the commands go.
    log: CommandLog,

    /// Whether [`LightingDriver::release`] has been called.
    released: bool,
}

impl RecordingDriver {
    /// Create a new driver with the given devices and return it with a handle to its log.
    pub fn new(devices: Vec<DeviceInfo>) -> (Self, CommandLog) {
        let log = CommandLog::default();
        (
            Self {
                devices,
                log: log.clone(),
                released: false,
            },
            log,
        )
    }

    /// Check that the device index is valid.
    fn check_device(&self, device: usize) -> Result<&DeviceInfo, DriverError> {
        if self.released {
            return Err(DriverError::Disconnected);
        }
        self.devices
            .get(device)
            .ok_or(DriverError::UnknownDevice(device))
    }
}

impl LightingDriver for RecordingDriver {
    fn is_connected(&self) -> bool {
        !self.released
    }

    fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    fn set_mode(&mut self, device: usize, mode: ModeRequest) -> Result<(), DriverError> {
        if mode.index >= self.check_device(device)?.modes.len() {
            return Err(DriverError::UnknownMode {
                device,
                mode: mode.index,
            });
        }
        self.log.push(DriverCommand::SetMode { device, mode });
        Ok(())
    }

    fn update_leds(&mut self, device: usize, colours: &[RGBArray]) -> Result<(), DriverError> {
        self.check_device(device)?;
        self.log.push(DriverCommand::UpdateLeds {
            device,
            colours: colours.to_vec(),
        });
        Ok(())
    }

    fn update_zone_leds(
        &mut self,
        device: usize,
        zone: usize,
        colours: &[RGBArray],
    ) -> Result<(), DriverError> {
        if zone >= self.check_device(device)?.zones.len() {
            return Err(DriverError::UnknownZone { device, zone });
        }
        self.log.push(DriverCommand::UpdateZoneLeds {
            device,
            zone,
            colours: colours.to_vec(),
        });
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.log.push(DriverCommand::Release);
    }
}
