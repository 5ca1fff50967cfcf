//! Payload decoding for the probe's GATT characteristics.
//!
//! The probe packs every telemetry value as a little-endian 16-bit word
//! carrying a signed 12-bit quantity. Temperatures use a fixed linear
//! calibration of 1/16 °C per step with a half-degree offset.

use tracing::trace;

use crate::error::{Error, Result};

/// Exact size of the temperature characteristic payload.
pub const TEMPERATURE_PAYLOAD_LEN: usize = 8;

/// Minimum size of the battery characteristic payload.
pub const BATTERY_PAYLOAD_MIN_LEN: usize = 2;

/// Upper bound applied to the ambient offset word.
pub const AMBIENT_OFFSET_LIMIT: i32 = 48;

/// Thermistor compensation numerator (16 * 589).
pub const AMBIENT_COMPENSATION_NUMERATOR: i32 = 9424;

/// Thermistor compensation denominator.
pub const AMBIENT_COMPENSATION_DENOMINATOR: i32 = 1487;

/// The probe reports battery in 10% steps.
pub const BATTERY_SCALE: i32 = 10;

/// Decode two raw bytes as a little-endian signed 12-bit value.
///
/// Words at or above 2048 are sign-extended from bit 11, so `0x0800`
/// decodes to -2048 and `0x0FFF` to -1. Every byte pair is valid input.
///
/// # Example
///
/// ```
/// use meater_rust_ble::protocol::decode_signed_12bit;
///
/// assert_eq!(decode_signed_12bit(0xFF, 0x07), 2047);
/// assert_eq!(decode_signed_12bit(0x00, 0x08), -2048);
/// assert_eq!(decode_signed_12bit(0xFC, 0x0F), -4);
/// ```
pub fn decode_signed_12bit(low_byte: u8, high_byte: u8) -> i16 {
    let combined = u16::from_le_bytes([low_byte, high_byte]);
    if combined >= 2048 {
        // Bits 12-15 are forced high, matching the hardware's sign extension.
        (combined & 0x0FFF) as i16 - 4096
    } else {
        combined as i16
    }
}

/// Convert a raw temperature value to Celsius.
///
/// `raw_to_celsius(0)` is 0.5 °C and `raw_to_celsius(-8)` is 0.0 °C.
#[inline]
pub fn raw_to_celsius(raw: i32) -> f64 {
    (raw as f64 + 8.0) / 16.0
}

/// Temperatures decoded from one temperature characteristic payload.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedTemperatures {
    /// Raw tip value (bytes 0-1).
    pub tip_raw: i16,
    /// Compensated ambient value, in raw units.
    pub ambient_raw: i32,
    /// Opaque diagnostic word (bytes 6-7), carried through unchanged.
    pub diagnostic_raw: i16,
    /// Tip temperature in Celsius.
    pub tip_celsius: f64,
    /// Ambient temperature in Celsius.
    pub ambient_celsius: f64,
}

/// Decode the 8-byte temperature characteristic payload.
///
/// Layout, four little-endian signed 12-bit words:
/// - Bytes 0-1: tip
/// - Bytes 2-3: ambient
/// - Bytes 4-5: ambient offset
/// - Bytes 6-7: diagnostic (seen as 0x1f and 0x20)
///
/// The ambient word is compensated against the offset and reported
/// relative to the tip, never below it.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] unless `data` is exactly 8 bytes.
pub fn decode_temperature_payload(data: &[u8]) -> Result<DecodedTemperatures> {
    trace!("Decoding temperature payload: {:02X?}", data);

    if data.len() != TEMPERATURE_PAYLOAD_LEN {
        return Err(Error::MalformedPayload {
            expected: TEMPERATURE_PAYLOAD_LEN,
            actual: data.len(),
        });
    }

    let tip_raw = decode_signed_12bit(data[0], data[1]);
    let ambient_word = decode_signed_12bit(data[2], data[3]);
    let ambient_offset = decode_signed_12bit(data[4], data[5]);
    let diagnostic_raw = decode_signed_12bit(data[6], data[7]);

    let offset = AMBIENT_OFFSET_LIMIT.min(i32::from(ambient_offset));
    let mut ambient_raw = (i32::from(ambient_word) - offset) * AMBIENT_COMPENSATION_NUMERATOR;
    // Integer division truncates toward zero.
    ambient_raw /= AMBIENT_COMPENSATION_DENOMINATOR;
    ambient_raw = ambient_raw.max(0);
    ambient_raw += i32::from(tip_raw);

    Ok(DecodedTemperatures {
        tip_raw,
        ambient_raw,
        diagnostic_raw,
        tip_celsius: raw_to_celsius(i32::from(tip_raw)),
        ambient_celsius: raw_to_celsius(ambient_raw),
    })
}

/// Decode the battery characteristic payload into a percentage.
///
/// Only the first two bytes are significant. The value is trusted as
/// reported and not clamped.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] when fewer than 2 bytes are present.
pub fn decode_battery_payload(data: &[u8]) -> Result<i32> {
    if data.len() < BATTERY_PAYLOAD_MIN_LEN {
        return Err(Error::MalformedPayload {
            expected: BATTERY_PAYLOAD_MIN_LEN,
            actual: data.len(),
        });
    }

    Ok(i32::from(decode_signed_12bit(data[0], data[1])) * BATTERY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::celsius_to_fahrenheit;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn word(value: u16) -> (u8, u8) {
        let [low, high] = value.to_le_bytes();
        (low, high)
    }

    #[test]
    fn test_signed_12bit_boundaries() {
        let (l, h) = word(2047);
        assert_eq!(decode_signed_12bit(l, h), 2047);
        let (l, h) = word(2048);
        assert_eq!(decode_signed_12bit(l, h), -2048);
        let (l, h) = word(0);
        assert_eq!(decode_signed_12bit(l, h), 0);
        let (l, h) = word(4095);
        assert_eq!(decode_signed_12bit(l, h), -1);
    }

    #[test]
    fn test_signed_12bit_high_nibble_forced() {
        // Bits above 11 only matter through the sign branch.
        assert_eq!(decode_signed_12bit(0xFF, 0xFF), -1);
        assert_eq!(decode_signed_12bit(0x00, 0x10), -4096);
    }

    #[test]
    fn test_raw_to_celsius() {
        assert_eq!(raw_to_celsius(0), 0.5);
        assert_eq!(raw_to_celsius(-8), 0.0);
        assert_eq!(raw_to_celsius(355), 22.6875);
    }

    #[test]
    fn test_decode_reference_payload() {
        let data = [0x63, 0x01, 0x2b, 0x00, 0x25, 0x00, 0x20, 0x00];
        let decoded = decode_temperature_payload(&data).unwrap();

        assert_eq!(decoded.tip_raw, 355);
        assert_eq!(decoded.ambient_raw, 393);
        assert_eq!(decoded.diagnostic_raw, 32);
        assert_eq!(decoded.tip_celsius, 22.6875);
        assert_eq!(decoded.ambient_celsius, 25.0625);
    }

    #[test]
    fn test_decode_recorded_payloads() {
        let decoded =
            decode_temperature_payload(&[0x30, 0x00, 0x32, 0x00, 0x25, 0x00, 0x1f, 0x00]).unwrap();
        assert_eq!(decoded.tip_celsius, 3.5);
        assert_eq!(decoded.ambient_raw, 130);
        assert_eq!(decoded.ambient_celsius, 8.625);
        assert_eq!(decoded.diagnostic_raw, 31);

        // Tip below zero raw.
        let decoded =
            decode_temperature_payload(&[0xfc, 0x0f, 0x35, 0x00, 0x25, 0x00, 0x1f, 0x00]).unwrap();
        assert_eq!(decoded.tip_raw, -4);
        assert_eq!(decoded.tip_celsius, 0.25);
        assert_eq!(decoded.ambient_raw, 97);
        assert_eq!(decoded.ambient_celsius, 6.5625);
    }

    #[test]
    fn test_ambient_never_below_tip() {
        // ambient 10 < offset 37, compensation clamps to zero.
        let decoded =
            decode_temperature_payload(&[0x63, 0x01, 0x0a, 0x00, 0x25, 0x00, 0x20, 0x00]).unwrap();
        assert_eq!(decoded.ambient_raw, i32::from(decoded.tip_raw));
        assert_eq!(decoded.ambient_celsius, decoded.tip_celsius);
    }

    #[test]
    fn test_offset_capped_at_limit() {
        // offset word 100 is capped to 48: (60 - 48) * 9424 / 1487 = 76
        let decoded =
            decode_temperature_payload(&[0x00, 0x00, 0x3c, 0x00, 0x64, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(decoded.ambient_raw, 76);
    }

    #[test]
    fn test_decode_wrong_length() {
        for len in [0usize, 1, 7, 9, 20] {
            let data = vec![0u8; len];
            match decode_temperature_payload(&data) {
                Err(Error::MalformedPayload { expected, actual }) => {
                    assert_eq!(expected, 8);
                    assert_eq!(actual, len);
                }
                other => panic!("expected MalformedPayload for {} bytes, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_decode_battery() {
        assert_eq!(decode_battery_payload(&[0x0a, 0x00]).unwrap(), 100);
        assert_eq!(decode_battery_payload(&[0x07, 0x00, 0xff]).unwrap(), 70);
        assert!(matches!(
            decode_battery_payload(&[0x05]),
            Err(Error::MalformedPayload {
                expected: 2,
                actual: 1
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_decode_is_total(data in proptest::array::uniform8(any::<u8>())) {
            let decoded = decode_temperature_payload(&data).unwrap();
            prop_assert!(decoded.ambient_raw >= i32::from(decoded.tip_raw));
        }

        #[test]
        fn prop_calibration_monotonic(raw in -4096i32..40000) {
            let lower = celsius_to_fahrenheit(raw_to_celsius(raw));
            let upper = celsius_to_fahrenheit(raw_to_celsius(raw + 1));
            prop_assert!(upper > lower);
        }
    }
}
