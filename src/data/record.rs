//! Flattened per-cycle record for display and log consumers.

use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::data::{ProbeIdentity, ProbeReading};

/// A snapshot of one probe's identity and latest reading.
///
/// This is what the poller hands to sinks after each successful read.
/// Values a probe has not reported yet are `None`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeRecord {
    /// BLE address.
    pub address: String,
    /// Hardware model name.
    pub device_name: Option<String>,
    /// Firmware revision.
    pub firmware_revision: Option<String>,
    /// Tip temperature in Celsius.
    pub tip_celsius: Option<f64>,
    /// Tip temperature in Fahrenheit.
    pub tip_fahrenheit: Option<f64>,
    /// Ambient temperature in Celsius.
    pub ambient_celsius: Option<f64>,
    /// Ambient temperature in Fahrenheit.
    pub ambient_fahrenheit: Option<f64>,
    /// Battery level in percent.
    pub battery_percent: Option<i32>,
    /// Seconds since the reading was last updated.
    pub age_secs: Option<f64>,
    /// Opaque diagnostic word.
    pub diagnostic_raw: Option<i16>,
    /// When this record was taken.
    pub captured_at: DateTime<Utc>,
}

impl ProbeRecord {
    /// Build a record from an identity and reading as of `now`.
    pub fn from_parts(identity: &ProbeIdentity, reading: &ProbeReading, now: Instant) -> Self {
        Self {
            address: identity.address.clone(),
            device_name: identity.device_name.clone(),
            firmware_revision: identity.firmware_revision.clone(),
            tip_celsius: reading.tip_celsius(),
            tip_fahrenheit: reading.tip_fahrenheit(),
            ambient_celsius: reading.ambient_celsius(),
            ambient_fahrenheit: reading.ambient_fahrenheit(),
            battery_percent: reading.battery_percent(),
            age_secs: reading.age_at(now).map(|age| age.as_secs_f64()),
            diagnostic_raw: reading.diagnostic_raw(),
            captured_at: Utc::now(),
        }
    }

    /// Whether the record carries both temperatures and battery.
    pub fn is_complete(&self) -> bool {
        self.tip_celsius.is_some()
            && self.ambient_celsius.is_some()
            && self.battery_percent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_temperature_payload;
    use std::time::Duration;

    #[test]
    fn test_record_from_parts() {
        let mut identity = ProbeIdentity::new("D0:D9:4F:83:E8:EB");
        identity.device_name = Some("MEATER".to_string());
        identity.firmware_revision = Some("v1.0.5_0".to_string());

        let start = Instant::now();
        let mut reading = ProbeReading::new();
        reading.record_temperatures(
            decode_temperature_payload(&[0x63, 0x01, 0x2b, 0x00, 0x25, 0x00, 0x20, 0x00])
                .unwrap(),
            start,
        );
        reading.record_battery(90, start);

        let record = ProbeRecord::from_parts(&identity, &reading, start + Duration::from_secs(2));

        assert_eq!(record.address, "D0:D9:4F:83:E8:EB");
        assert_eq!(record.device_name.as_deref(), Some("MEATER"));
        assert_eq!(record.tip_celsius, Some(22.6875));
        assert_eq!(record.ambient_celsius, Some(25.0625));
        assert_eq!(record.battery_percent, Some(90));
        assert_eq!(record.diagnostic_raw, Some(32));
        assert_eq!(record.age_secs, Some(2.0));
        assert!(record.is_complete());
    }

    #[test]
    fn test_record_before_first_read() {
        let record = ProbeRecord::from_parts(
            &ProbeIdentity::new("AA:BB:CC:DD:EE:FF"),
            &ProbeReading::new(),
            Instant::now(),
        );
        assert_eq!(record.tip_fahrenheit, None);
        assert_eq!(record.age_secs, None);
        assert!(!record.is_complete());
    }
}
