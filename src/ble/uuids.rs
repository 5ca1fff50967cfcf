//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for MEATER probe communication.

use uuid::Uuid;

// MEATER custom service
/// Service advertised by every MEATER probe, used for discovery.
pub const MEATER_SERVICE_UUID: Uuid = Uuid::from_u128(0xa75cc7fc_c956_488f_ac2a_2dbc08b63a04);

/// Temperature characteristic UUID (Read, 8-byte payload).
pub const TEMPERATURES_UUID: Uuid = Uuid::from_u128(0x7edda774_045e_4bbf_909b_45d1991a2876);

/// Battery characteristic UUID (Read, 2-byte payload).
pub const BATTERY_UUID: Uuid = Uuid::from_u128(0x2adb4877_68d8_4884_bd3c_d83853bf27b8);

// Generic Access / Device Information (Standard BLE)
/// Device Name characteristic UUID.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb);

/// Firmware Revision characteristic UUID.
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID indicates a MEATER probe.
pub fn is_probe_service(uuid: &Uuid) -> bool {
    *uuid == MEATER_SERVICE_UUID
}
