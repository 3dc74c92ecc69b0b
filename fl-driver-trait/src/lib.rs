//! This crate provides the [`LightingDriver`] trait and the types that describe the devices
//! behind it.
//!
//! It's structured like this to avoid dependency cycles.

use std::io;
use thiserror::Error;

#[cfg(feature = "recording")]
mod recording;

#[cfg(feature = "recording")]
pub use self::recording::{CommandLog, DriverCommand, RecordingDriver};

/// An RGB colour.
pub type RGBArray = [u8; 3];

/// One lighting mode that a device supports, like "Static" or "Breathing".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeInfo {
    /// The name of the mode, as reported by the device.
    pub name: String,

    /// The lowest and highest animation speed, if the mode has a speed at all.
    pub speed_range: Option<(u32, u32)>,

    /// The maximum number of colours that the mode takes.
    pub colours_max: u32,
}

/// An addressable group of LEDs on a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneInfo {
    /// The name of the zone.
    pub name: String,

    /// How many LEDs are in this zone.
    pub led_count: usize,
}

/// A single RGB device, as discovered when the driver connected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The human readable name of the device.
    pub name: String,

    /// Every mode the device supports, in device order. Modes are addressed by index.
    pub modes: Vec<ModeInfo>,

    /// Every zone on the device, in device order. Zones are addressed by index.
    pub zones: Vec<ZoneInfo>,

    /// The number of colours the device holds, which is one per LED.
    pub colour_count: usize,
}

impl DeviceInfo {
    /// Describe a device with the given zone sizes and a number of generically named modes.
    pub fn with_zones(name: &str, zone_sizes: &[usize], mode_count: usize) -> Self {
        Self {
            name: name.to_string(),
            modes: (0..mode_count)
                .map(|i| ModeInfo {
                    name: format!("Mode {i}"),
                    speed_range: None,
                    colours_max: 0,
                })
                .collect(),
            zones: zone_sizes
                .iter()
                .enumerate()
                .map(|(i, &led_count)| ZoneInfo {
                    name: format!("Zone {i}"),
                    led_count,
                })
                .collect(),
            colour_count: zone_sizes.iter().sum(),
        }
    }
}

/// A request to switch a device into one of its modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeRequest {
    /// The index of the mode in [`DeviceInfo::modes`].
    pub index: usize,

    /// Override the animation speed of the mode.
    pub speed: Option<u32>,

    /// Override the animation direction of the mode.
    pub direction: Option<u32>,
}

impl ModeRequest {
    /// Request the mode at the given index with its speed and direction unchanged.
    pub fn index(index: usize) -> Self {
        Self {
            index,
            speed: None,
            direction: None,
        }
    }
}

/// An error from a lighting driver.
#[derive(Debug, Error)]
#[allow(missing_docs, reason = "the #[error] attributes document the variants")]
pub enum DriverError {
    #[error("IO error: `{0:?}`")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("There is no device with index {0}")]
    UnknownDevice(usize),

    #[error("Device {device} has no zone with index {zone}")]
    UnknownZone { device: usize, zone: usize },

    #[error("Device {device} has no mode with index {mode}")]
    UnknownMode { device: usize, mode: usize },

    #[error("The driver is not connected")]
    Disconnected,
}

/// The trait implemented by all lighting drivers.
///
/// Implementors discover their devices when they connect, and [`devices`](Self::devices) must
/// keep returning that same list for the lifetime of the driver, since every other method
/// addresses devices, zones, and modes by their index into it.
pub trait LightingDriver: Send {
    /// Is the connection to the lighting hardware alive?
    fn is_connected(&self) -> bool;

    /// Every device that was found when the driver connected.
    fn devices(&self) -> &[DeviceInfo];

    /// Switch the given device into a mode.
    fn set_mode(&mut self, device: usize, mode: ModeRequest) -> Result<(), DriverError>;

    /// Set the colours of every LED on a device, starting from the first one.
    fn update_leds(&mut self, device: usize, colours: &[RGBArray]) -> Result<(), DriverError>;

    /// Set the colours of the LEDs in one zone of a device, starting from the first one.
    fn update_zone_leds(
        &mut self,
        device: usize,
        zone: usize,
        colours: &[RGBArray],
    ) -> Result<(), DriverError>;

    /// Close the connection. Calling any other method afterwards may fail.
    fn release(&mut self) {}
}
