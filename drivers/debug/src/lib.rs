//! This crate provides a very simple [`DebugDriver`] to test things with.

use fl_driver_trait::{DeviceInfo, DriverError, LightingDriver, ModeRequest, RGBArray};
use tracing::{info, instrument};

/// A simple debug driver that pretends to have one keyboard-sized device and just logs all its
/// input with tracing at the info level.
pub struct DebugDriver {
    /// The fake devices.
    devices: Vec<DeviceInfo>,

    /// Whether [`LightingDriver::release`] has been called.
    released: bool,
}

impl DebugDriver {
    /// Initialise the driver.
    pub fn init() -> Self {
        Self {
            devices: vec![DeviceInfo::with_zones("Debug device", &[16, 8], 5)],
            released: false,
        }
    }

    /// Look up the device or fail with [`DriverError::UnknownDevice`].
    fn device(&self, device: usize) -> Result<&DeviceInfo, DriverError> {
        self.devices
            .get(device)
            .ok_or(DriverError::UnknownDevice(device))
    }
}

impl LightingDriver for DebugDriver {
    fn is_connected(&self) -> bool {
        !self.released
    }

    fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    #[instrument(skip(self))]
    fn set_mode(&mut self, device: usize, mode: ModeRequest) -> Result<(), DriverError> {
        let info = self.device(device)?;
        let Some(mode_info) = info.modes.get(mode.index) else {
            return Err(DriverError::UnknownMode {
                device,
                mode: mode.index,
            });
        };
        info!(device = %info.name, mode = %mode_info.name, "Set mode");
        Ok(())
    }

    #[instrument(skip(self, colours))]
    fn update_leds(&mut self, device: usize, colours: &[RGBArray]) -> Result<(), DriverError> {
        self.device(device)?;
        info!(?colours);
        Ok(())
    }

    #[instrument(skip(self, colours))]
    fn update_zone_leds(
        &mut self,
        device: usize,
        zone: usize,
        colours: &[RGBArray],
    ) -> Result<(), DriverError> {
        if zone >= self.device(device)?.zones.len() {
            return Err(DriverError::UnknownZone { device, zone });
        }
        info!(?colours);
        Ok(())
    }

    fn release(&mut self) {
        info!("Releasing debug driver");
        self.released = true;
    }
}
