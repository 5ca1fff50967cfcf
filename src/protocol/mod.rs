//! Protocol module for decoding probe payloads.
//!
//! This module contains the implementations for:
//! - Signed 12-bit word decoding
//! - Temperature calibration and thermistor compensation
//! - Battery level decoding

pub mod codec;

pub use codec::{
    decode_battery_payload, decode_signed_12bit, decode_temperature_payload, raw_to_celsius,
    DecodedTemperatures,
};
