// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # meater-rust-ble
//!
//! A Rust library for reading live telemetry from MEATER wireless meat
//! thermometer probes over Bluetooth Low Energy.
//!
//! Each probe exposes a tip temperature, an ambient temperature and a
//! battery level through plain GATT reads. This crate connects to one or
//! more probes, decodes their payloads and keeps polling them for as long
//! as the process runs, skipping probes that drop out without stalling
//! the rest.
//!
//! ## Features
//!
//! - **Probe Discovery**: Scan for probes advertising the MEATER service
//! - **Calibrated Temperatures**: Tip and thermistor-compensated ambient readings
//! - **Battery Level**: As reported by the probe, in 10% steps
//! - **Fleet Polling**: Read many probes in one loop with per-probe failure isolation
//! - **Pluggable Transport**: `btleplug` by default, any [`Transport`] for tests or other stacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meater_rust_ble::{BtleplugTransport, FleetConfig, FleetPoller, Result};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = Arc::new(BtleplugTransport::new().await?);
//!     let poller = FleetPoller::new(transport, FleetConfig::default());
//!
//!     // Find probes in range and connect to them
//!     poller.connect_discovered(Duration::from_secs(5)).await?;
//!
//!     for outcome in poller.poll_once().await {
//!         println!("{:?}", outcome);
//!     }
//!
//!     poller.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission. Peripherals are identified by a
//! platform UUID rather than a MAC address.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod data;
pub mod discovery;
pub mod error;
pub mod fleet;
pub mod protocol;
pub mod session;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use discovery::DiscoveryGateway;
pub use error::{Error, Result};
pub use fleet::{FleetConfig, FleetPoller, PollOutcome, ReconnectPolicy, SkipReason};
pub use session::ProbeSession;
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use ble::{
    BtleplugTransport, CharacteristicHandle, CharacteristicLayout, ConnectionState, Link, Locator,
    Transport,
};
pub use data::{ProbeIdentity, ProbeReading, ProbeRecord};
pub use protocol::DecodedTemperatures;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<FleetPoller>();
        let _ = std::any::TypeId::of::<ProbeSession>();
        let _ = std::any::TypeId::of::<DiscoveryGateway>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<ProbeRecord>();
        let _ = std::any::TypeId::of::<DecodedTemperatures>();
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
    }
}
