//! Cached telemetry of one probe.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::protocol::DecodedTemperatures;
use crate::utils::celsius_to_fahrenheit;

/// The latest successfully decoded values from a probe.
///
/// Fields are only replaced after a complete decode, so a reading is never
/// observed half-written. The update timestamp never moves backward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReading {
    /// Last decoded temperature payload.
    temperatures: Option<DecodedTemperatures>,
    /// Last battery level, in percent.
    battery_percent: Option<i32>,
    /// Monotonic time of the last update.
    last_update: Option<Instant>,
    /// Wall-clock time of the last update.
    last_update_utc: Option<DateTime<Utc>>,
}

impl ProbeReading {
    /// An empty reading; nothing has been read yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last decoded temperature payload.
    pub fn temperatures(&self) -> Option<DecodedTemperatures> {
        self.temperatures
    }

    /// Tip temperature in Celsius.
    pub fn tip_celsius(&self) -> Option<f64> {
        self.temperatures.map(|t| t.tip_celsius)
    }

    /// Ambient temperature in Celsius.
    pub fn ambient_celsius(&self) -> Option<f64> {
        self.temperatures.map(|t| t.ambient_celsius)
    }

    /// Tip temperature in Fahrenheit.
    pub fn tip_fahrenheit(&self) -> Option<f64> {
        self.tip_celsius().map(celsius_to_fahrenheit)
    }

    /// Ambient temperature in Fahrenheit.
    pub fn ambient_fahrenheit(&self) -> Option<f64> {
        self.ambient_celsius().map(celsius_to_fahrenheit)
    }

    /// Opaque diagnostic word from the temperature payload.
    pub fn diagnostic_raw(&self) -> Option<i16> {
        self.temperatures.map(|t| t.diagnostic_raw)
    }

    /// Battery level in percent, as reported.
    pub fn battery_percent(&self) -> Option<i32> {
        self.battery_percent
    }

    /// Monotonic time of the last successful update.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Wall-clock time of the last successful update.
    pub fn last_update_utc(&self) -> Option<DateTime<Utc>> {
        self.last_update_utc
    }

    /// Time since the last update, `None` if never updated.
    pub fn age(&self) -> Option<Duration> {
        self.age_at(Instant::now())
    }

    /// Time between the last update and `now`.
    pub fn age_at(&self, now: Instant) -> Option<Duration> {
        self.last_update
            .map(|last| now.saturating_duration_since(last))
    }

    /// Whether the reading is older than `max_age` (or was never taken).
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age().map(|age| age > max_age).unwrap_or(true)
    }

    /// Store a decoded temperature payload.
    pub(crate) fn record_temperatures(&mut self, temperatures: DecodedTemperatures, at: Instant) {
        self.temperatures = Some(temperatures);
        self.touch(at);
    }

    /// Store a decoded battery level.
    pub(crate) fn record_battery(&mut self, percent: i32, at: Instant) {
        self.battery_percent = Some(percent);
        self.touch(at);
    }

    fn touch(&mut self, at: Instant) {
        let at = match self.last_update {
            Some(previous) if previous > at => previous,
            _ => at,
        };
        self.last_update = Some(at);
        self.last_update_utc = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_temperature_payload;

    fn reference_temperatures() -> DecodedTemperatures {
        decode_temperature_payload(&[0x63, 0x01, 0x2b, 0x00, 0x25, 0x00, 0x20, 0x00]).unwrap()
    }

    #[test]
    fn test_empty_reading() {
        let reading = ProbeReading::new();
        assert_eq!(reading.tip_celsius(), None);
        assert_eq!(reading.battery_percent(), None);
        assert_eq!(reading.age(), None);
        assert!(reading.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn test_record_temperatures() {
        let mut reading = ProbeReading::new();
        let now = Instant::now();
        reading.record_temperatures(reference_temperatures(), now);

        assert_eq!(reading.tip_celsius(), Some(22.6875));
        assert_eq!(reading.ambient_celsius(), Some(25.0625));
        assert_eq!(reading.diagnostic_raw(), Some(32));
        assert!((reading.tip_fahrenheit().unwrap() - 72.8375).abs() < 1e-9);
        assert_eq!(reading.last_update(), Some(now));
        assert!(reading.last_update_utc().is_some());
        assert!(!reading.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_timestamp_never_moves_backward() {
        let mut reading = ProbeReading::new();
        let earlier = Instant::now();
        let later = earlier + Duration::from_secs(5);

        reading.record_battery(80, later);
        reading.record_battery(70, earlier);

        assert_eq!(reading.last_update(), Some(later));
        assert_eq!(reading.battery_percent(), Some(70));
    }

    #[test]
    fn test_age_at() {
        let mut reading = ProbeReading::new();
        let start = Instant::now();
        reading.record_battery(100, start);

        assert_eq!(
            reading.age_at(start + Duration::from_secs(3)),
            Some(Duration::from_secs(3))
        );
    }
}
