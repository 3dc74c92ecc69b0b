//! This module provides the [`Dispatcher`], which turns one sample into lighting commands.

use crate::policy::{ColourPolicy, ModeIndices};
use fl_driver_trait::{DriverError, LightingDriver, ModeRequest};
use fl_telemetry::TelemetrySample;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use tracing_unwrap::ResultExt;

/// Applies a [`ColourPolicy`] to every device behind a driver.
///
/// The driver sits behind a mutex which is held for the whole set of commands for a sample, so
/// samples dispatched from different threads never interleave.
#[derive(Debug)]
pub struct Dispatcher<D> {
    driver: Mutex<D>,
    policy: ColourPolicy,
    modes: ModeIndices,
}

impl<D: LightingDriver> Dispatcher<D> {
    /// Create a new dispatcher.
    pub fn new(driver: D, policy: ColourPolicy, modes: ModeIndices) -> Self {
        Self {
            driver: Mutex::new(driver),
            policy,
            modes,
        }
    }

    /// Lock the driver.
    pub fn driver(&self) -> MutexGuard<'_, D> {
        self.driver
            .lock()
            .expect_or_log("Should be able to lock the lighting driver")
    }

    /// The policy in use.
    pub fn policy(&self) -> &ColourPolicy {
        &self.policy
    }

    /// Select the look for this sample and send it to every zone of every device.
    ///
    /// Each zone gets the mode first and then the colour. A device with no zones gets one mode
    /// and one fill for the whole device. If the device doesn't have the mode, the mode is
    /// skipped with a warning but the colour is still sent.
    pub fn apply(&self, sample: &TelemetrySample) -> Result<(), DriverError> {
        let look = self.policy.select(sample);
        let mode = self.modes.resolve(look.mode);
        debug!(flags = ?sample.session_flags, speed = sample.speed, ?look, "Dispatching sample");

        let mut driver = self.driver();
        for device in 0..driver.devices().len() {
            let info = &driver.devices()[device];
            let zone_sizes: Vec<usize> = info.zones.iter().map(|zone| zone.led_count).collect();
            let colour_count = info.colour_count;

            let mode = match mode {
                Some(index) if index < info.modes.len() => Some(ModeRequest::index(index)),
                Some(index) => {
                    warn!(device, mode = index, name = %info.name, "Device has no such mode");
                    None
                }
                None => None,
            };

            if zone_sizes.is_empty() {
                if let Some(mode) = mode {
                    driver.set_mode(device, mode)?;
                }
                driver.update_leds(device, &look.fill.colours(look.colour, colour_count))?;
            } else {
                for (zone, led_count) in zone_sizes.into_iter().enumerate() {
                    if let Some(mode) = mode {
                        driver.set_mode(device, mode)?;
                    }
                    driver.update_zone_leds(
                        device,
                        zone,
                        &look.fill.colours(look.colour, led_count),
                    )?;
                }
            }
        }

        Ok(())
    }
}
