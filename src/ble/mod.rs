//! BLE communication module.
//!
//! This module provides the transport seam the probe core runs on, the
//! `btleplug` backend for it, and the GATT identifiers MEATER probes use.

pub mod btleplug_transport;
pub mod connection;
pub mod locator;
pub mod transport;
pub mod uuids;

pub use btleplug_transport::BtleplugTransport;
pub use connection::ConnectionState;
pub use locator::{CharacteristicLayout, Locator};
pub use transport::{CharacteristicHandle, Link, Transport};
pub use uuids::*;
