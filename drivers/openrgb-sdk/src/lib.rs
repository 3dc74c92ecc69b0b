//! This crate provides a driver for RGB devices managed by an OpenRGB SDK server.
//!
//! The protocol itself is spoken by the [`openrgb`] crate, which is async, so the driver owns a
//! small current-thread runtime and blocks on every request.

use fl_driver_trait::{
    DeviceInfo, DriverError, LightingDriver, ModeInfo, ModeRequest, RGBArray, ZoneInfo,
};
use openrgb::{
    data::{Color, Controller, Direction, Mode},
    OpenRGB, OpenRGBError,
};
use std::{future::Future, io, time::Duration};
use tokio::{net::TcpStream, runtime::Runtime};
use tracing::{debug, info, instrument, warn};
use tracing_unwrap::ResultExt;

/// How long to wait for the server to accept us and describe its devices.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A driver that talks to an OpenRGB SDK server over TCP.
pub struct OpenRgbDriver {
    /// Drives the async client.
    runtime: Runtime,

    /// The connection to the server, or `None` once released.
    client: Option<OpenRGB<TcpStream>>,

    /// The controllers as the server described them. Mode changes start from these.
    controllers: Vec<Controller>,

    /// The controllers as described to the rest of the program.
    devices: Vec<DeviceInfo>,
}

/// Copy a [`Mode`] field by field, since the `openrgb` crate does not derive `Clone` for it.
fn clone_mode(mode: &Mode) -> Mode {
    Mode {
        name: mode.name.clone(),
        value: mode.value,
        flags: mode.flags,
        speed_min: mode.speed_min,
        speed_max: mode.speed_max,
        speed: mode.speed,
        brightness_min: mode.brightness_min,
        brightness_max: mode.brightness_max,
        brightness: mode.brightness,
        color_mode: mode.color_mode,
        colors: mode.colors.clone(),
        colors_min: mode.colors_min,
        colors_max: mode.colors_max,
        direction: mode.direction,
    }
}

/// Turn an error from the client into a [`DriverError`].
fn driver_error(error: OpenRGBError) -> DriverError {
    DriverError::Protocol(error.to_string())
}

/// The OpenRGB direction with the given index, if there is one.
fn direction(index: u32) -> Option<Direction> {
    Some(match index {
        0 => Direction::Left,
        1 => Direction::Right,
        2 => Direction::Up,
        3 => Direction::Down,
        4 => Direction::Horizontal,
        5 => Direction::Vertical,
        _ => return None,
    })
}

/// Describe a server-side controller as a [`DeviceInfo`].
fn device_info(controller: &Controller) -> DeviceInfo {
    DeviceInfo {
        name: controller.name.clone(),
        modes: controller
            .modes
            .iter()
            .map(|mode| ModeInfo {
                name: mode.name.clone(),
                speed_range: mode.speed_min.zip(mode.speed_max),
                colours_max: mode.colors_max.unwrap_or(0),
            })
            .collect(),
        zones: controller
            .zones
            .iter()
            .map(|zone| ZoneInfo {
                name: zone.name.clone(),
                led_count: zone.leds_count as usize,
            })
            .collect(),
        colour_count: controller.colors.len(),
    }
}

/// Convert our colours into the client's.
fn colors(colours: &[RGBArray]) -> Vec<Color> {
    colours.iter().map(|&[r, g, b]| Color::new(r, g, b)).collect()
}

impl OpenRgbDriver {
    /// Build the runtime that every request is driven by.
    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect_or_log("Should be able to build a runtime for the OpenRGB client")
    }

    /// A driver with no connection and no devices. Every command fails with
    /// [`DriverError::Disconnected`].
    pub fn disconnected() -> Self {
        Self {
            runtime: Self::runtime(),
            client: None,
            controllers: vec![],
            devices: vec![],
        }
    }

    /// Connect to the server at the given host and port, announce ourselves with the given
    /// client name, and fetch every controller.
    #[instrument]
    pub fn connect(host: &str, port: u16, client_name: &str) -> Result<Self, DriverError> {
        let runtime = Self::runtime();

        let (client, controllers) = runtime.block_on(async {
            tokio::time::timeout(CONNECT_TIMEOUT, async {
                let client = OpenRGB::connect_to((host, port))
                    .await
                    .map_err(driver_error)?;
                client.set_name(client_name).await.map_err(driver_error)?;

                let count = client.get_controller_count().await.map_err(driver_error)?;
                let mut controllers = Vec::with_capacity(count as usize);
                for index in 0..count {
                    let controller = client.get_controller(index).await.map_err(driver_error)?;
                    debug!(
                        index,
                        name = %controller.name,
                        active_mode = controller.active_mode,
                        leds = controller.leds.len(),
                        "Found controller"
                    );
                    controllers.push(controller);
                }

                Ok::<_, DriverError>((client, controllers))
            })
            .await
            .map_err(|_| {
                DriverError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "OpenRGB server took too long to answer",
                ))
            })?
        })?;

        let devices: Vec<DeviceInfo> = controllers.iter().map(device_info).collect();
        info!(devices = devices.len(), "Connected to OpenRGB server");

        Ok(Self {
            runtime,
            client: Some(client),
            controllers,
            devices,
        })
    }

    /// Run a request against the server.
    fn request<'a, F, Fut>(&'a self, f: F) -> Result<(), DriverError>
    where
        F: FnOnce(&'a OpenRGB<TcpStream>) -> Fut,
        Fut: Future<Output = Result<(), OpenRGBError>>,
    {
        let client = self.client.as_ref().ok_or(DriverError::Disconnected)?;
        self.runtime.block_on(f(client)).map_err(driver_error)
    }

    /// Look up the controller or fail with [`DriverError::UnknownDevice`].
    fn controller(&self, device: usize) -> Result<&Controller, DriverError> {
        if self.client.is_none() {
            return Err(DriverError::Disconnected);
        }
        self.controllers
            .get(device)
            .ok_or(DriverError::UnknownDevice(device))
    }
}

impl LightingDriver for OpenRgbDriver {
    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    #[instrument(skip(self))]
    fn set_mode(&mut self, device: usize, request: ModeRequest) -> Result<(), DriverError> {
        let Some(mode) = self.controller(device)?.modes.get(request.index) else {
            return Err(DriverError::UnknownMode {
                device,
                mode: request.index,
            });
        };

        let mut mode = clone_mode(mode);
        if let Some(speed) = request.speed {
            mode.speed = Some(speed);
        }
        match request.direction.map(|index| (index, direction(index))) {
            Some((_, Some(direction))) => mode.direction = Some(direction),
            Some((index, None)) => warn!(index, "Ignoring unknown mode direction"),
            None => {}
        }

        let sent = clone_mode(&mode);
        self.request(|client| client.update_mode(device as u32, request.index as i32, sent))?;

        let controller = &mut self.controllers[device];
        controller.active_mode = request.index as i32;
        controller.modes[request.index] = mode;
        Ok(())
    }

    #[instrument(skip(self, colours), fields(colours = colours.len()))]
    fn update_leds(&mut self, device: usize, colours: &[RGBArray]) -> Result<(), DriverError> {
        self.controller(device)?;
        self.request(|client| client.update_leds(device as u32, colors(colours)))
    }

    #[instrument(skip(self, colours), fields(colours = colours.len()))]
    fn update_zone_leds(
        &mut self,
        device: usize,
        zone: usize,
        colours: &[RGBArray],
    ) -> Result<(), DriverError> {
        if zone >= self.controller(device)?.zones.len() {
            return Err(DriverError::UnknownZone { device, zone });
        }
        self.request(|client| client.update_zone_leds(device as u32, zone as u32, colors(colours)))
    }

    fn release(&mut self) {
        if self.client.take().is_some() {
            info!("Closed OpenRGB connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream as StdTcpStream},
        sync::mpsc::{self, Receiver},
        thread,
    };

    /// Packet IDs that the fake server answers.
    const REQUEST_CONTROLLER_COUNT: u32 = 0;
    const REQUEST_PROTOCOL_VERSION: u32 = 40;
    const SET_CLIENT_NAME: u32 = 50;

    /// Write one packet with a `u32` payload.
    fn reply(stream: &mut StdTcpStream, device: u32, id: u32, value: u32) {
        let mut packet = b"ORGB".to_vec();
        for field in [device, id, 4, value] {
            packet.extend_from_slice(&field.to_le_bytes());
        }
        stream.write_all(&packet).unwrap();
    }

    /// Start a fake OpenRGB server with no controllers, which serves one client and reports the
    /// ID and payload of every packet it gets.
    fn fake_server() -> (u16, Receiver<(u32, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            loop {
                let mut header = [0; 16];
                if stream.read_exact(&mut header).is_err() {
                    return;
                }
                let field = |i: usize| u32::from_le_bytes(header[i..i + 4].try_into().unwrap());
                let (device, id, size) = (field(4), field(8), field(12));

                let mut payload = vec![0; size as usize];
                if stream.read_exact(&mut payload).is_err() {
                    return;
                }

                match id {
                    REQUEST_PROTOCOL_VERSION => {
                        reply(&mut stream, device, REQUEST_PROTOCOL_VERSION, 1)
                    }
                    REQUEST_CONTROLLER_COUNT => {
                        reply(&mut stream, device, REQUEST_CONTROLLER_COUNT, 0)
                    }
                    _ => {}
                }

                if tx.send((id, payload)).is_err() {
                    return;
                }
            }
        });

        (port, rx)
    }

    #[test]
    fn connect_announces_the_client_name() {
        let (port, rx) = fake_server();
        let driver = OpenRgbDriver::connect("127.0.0.1", port, "Flag Lights test").unwrap();

        let name = rx
            .iter()
            .find(|(id, _)| *id == SET_CLIENT_NAME)
            .map(|(_, payload)| payload)
            .unwrap();
        assert!(name.windows(16).any(|bytes| bytes == b"Flag Lights test"));

        assert!(driver.is_connected());
        assert!(driver.devices().is_empty());
    }

    #[test]
    fn bad_indices_are_rejected() {
        let (port, _rx) = fake_server();
        let mut driver = OpenRgbDriver::connect("127.0.0.1", port, "test").unwrap();

        assert!(matches!(
            driver.set_mode(0, ModeRequest::index(1)),
            Err(DriverError::UnknownDevice(0))
        ));
        assert!(matches!(
            driver.update_zone_leds(2, 0, &[[0, 0, 0]]),
            Err(DriverError::UnknownDevice(2))
        ));
        assert!(matches!(
            driver.update_leds(3, &[[0, 0, 0]]),
            Err(DriverError::UnknownDevice(3))
        ));
    }

    #[test]
    fn release_disconnects() {
        let (port, _rx) = fake_server();
        let mut driver = OpenRgbDriver::connect("127.0.0.1", port, "test").unwrap();

        driver.release();
        assert!(!driver.is_connected());
        assert!(matches!(
            driver.update_leds(0, &[[0, 0, 0]]),
            Err(DriverError::Disconnected)
        ));

        driver.release();
        assert!(!driver.is_connected());
    }

    #[test]
    fn unreachable_server_gives_an_empty_driver() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(OpenRgbDriver::connect("127.0.0.1", port, "test").is_err());

        let driver = OpenRgbDriver::disconnected();
        assert!(!driver.is_connected());
        assert!(driver.devices().is_empty());
    }

    #[test]
    fn direction_indices_follow_openrgb() {
        assert_eq!(direction(0), Some(Direction::Left));
        assert_eq!(direction(3), Some(Direction::Down));
        assert_eq!(direction(5), Some(Direction::Vertical));
        assert_eq!(direction(6), None);
    }
}
