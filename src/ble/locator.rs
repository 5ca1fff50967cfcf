//! Characteristic addressing.
//!
//! Probe firmware generations expose their characteristics either through
//! UUID lookup or at fixed GATT handles. A [`Locator`] names a
//! characteristic in one of the two schemes; the transport resolves it once
//! at connect time into an opaque handle.

use std::fmt;
use uuid::Uuid;

use crate::ble::uuids::*;

/// How to find a characteristic on a connected probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Look the characteristic up by UUID.
    ByUuid(Uuid),
    /// Use a fixed numeric GATT handle.
    ByHandle(u16),
}

impl Locator {
    /// The UUID, if this locator addresses by UUID.
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            Self::ByUuid(uuid) => Some(*uuid),
            Self::ByHandle(_) => None,
        }
    }

    /// The handle, if this locator addresses by fixed handle.
    pub fn handle(&self) -> Option<u16> {
        match self {
            Self::ByUuid(_) => None,
            Self::ByHandle(handle) => Some(*handle),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByUuid(uuid) => write!(f, "uuid {}", uuid),
            Self::ByHandle(handle) => write!(f, "handle {:#06x}", handle),
        }
    }
}

/// The four characteristics a session reads, by locator.
///
/// Device name and firmware revision are best-effort; temperatures and
/// battery are mandatory for a connection to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicLayout {
    /// Device name characteristic.
    pub device_name: Locator,
    /// Firmware revision characteristic.
    pub firmware_revision: Locator,
    /// Temperature characteristic.
    pub temperatures: Locator,
    /// Battery characteristic.
    pub battery: Locator,
}

impl CharacteristicLayout {
    /// Layout resolving every characteristic by its UUID.
    pub const fn by_uuid() -> Self {
        Self {
            device_name: Locator::ByUuid(DEVICE_NAME_UUID),
            firmware_revision: Locator::ByUuid(FIRMWARE_REVISION_UUID),
            temperatures: Locator::ByUuid(TEMPERATURES_UUID),
            battery: Locator::ByUuid(BATTERY_UUID),
        }
    }

    /// Layout using fixed GATT handles.
    pub const fn by_handles(
        device_name: u16,
        firmware_revision: u16,
        temperatures: u16,
        battery: u16,
    ) -> Self {
        Self {
            device_name: Locator::ByHandle(device_name),
            firmware_revision: Locator::ByHandle(firmware_revision),
            temperatures: Locator::ByHandle(temperatures),
            battery: Locator::ByHandle(battery),
        }
    }
}

impl Default for CharacteristicLayout {
    fn default() -> Self {
        Self::by_uuid()
    }
}
