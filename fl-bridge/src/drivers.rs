//! This module picks the lighting driver. See `Cargo.toml` for the features that enable each
//! driver and their explanations.

use fl_bridge::BridgeConfig;

// Thanks to the build script, we are guaranteed to have exactly one of these features enabled.
cfg_if::cfg_if! {
    if #[cfg(feature = "driver-debug")] {
        pub use debug::DebugDriver as DriverImpl;

        /// Initialise the driver.
        pub fn init(_config: &BridgeConfig) -> DriverImpl {
            DriverImpl::init()
        }
    } else if #[cfg(feature = "driver-openrgb")] {
        pub use openrgb_sdk::OpenRgbDriver as DriverImpl;

        /// Connect to the OpenRGB server. If it can't be reached, the driver is left
        /// disconnected and [`Bridge::check_connections`](fl_bridge::Bridge::check_connections)
        /// will say so.
        pub fn init(config: &BridgeConfig) -> DriverImpl {
            let openrgb = &config.openrgb;
            DriverImpl::connect(&openrgb.host, openrgb.port, &config.client_name).unwrap_or_else(|error| {
                tracing::error!(%error, "Unable to connect to the OpenRGB server");
                DriverImpl::disconnected()
            })
        }
    } else {
        compile_error!("You must enable exactly one driver feature");
    }
}
