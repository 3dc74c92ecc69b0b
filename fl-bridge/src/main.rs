//! This binary crate runs Flag Lights in the console until enter is pressed.

mod drivers;

use color_eyre::Result;
use fl_bridge::{logging::init_tracing, Bridge, BridgeConfig};
use std::io;
use tracing::{error, info, instrument};

/// Block until a line is read from stdin.
fn wait_for_enter() -> io::Result<()> {
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(())
}

/// Load the config, run the bridge until enter is pressed, then shut everything down.
#[instrument]
fn run() -> Result<()> {
    let path = BridgeConfig::config_path();
    let config = BridgeConfig::from_file(&path);
    info!(?path, "Loaded config");

    let source = config.telemetry.open()?;
    let driver = self::drivers::init(&config);
    let bridge = Bridge::new(source, driver, &config);
    bridge.check_connections();

    bridge.start()?;
    if config.fuel_logging {
        bridge.start_fuel_logging()?;
    }
    if config.export.enabled {
        bridge.start_export();
    }

    println!("Flag Lights is running. Press enter to stop.");
    wait_for_enter()?;

    info!("Shutting down");
    bridge.stop();
    bridge.stop_fuel_logging();
    bridge.stop_export();
    bridge.dispose();

    Ok(())
}

fn main() {
    let _guard = init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Flag Lights");

    if let Err(report) = color_eyre::install().and_then(|()| run()) {
        error!(%report, "Flag Lights stopped with an error");
        eprintln!("{report:?}");
        eprintln!("Press enter to exit.");
        let _ = wait_for_enter();
    }
}
