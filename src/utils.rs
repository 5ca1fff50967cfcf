//! Utility functions for the meater-rust-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Arguments
///
/// * `celsius` - Temperature in degrees Celsius
///
/// # Returns
///
/// Temperature in degrees Fahrenheit
///
/// # Example
///
/// ```
/// use meater_rust_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// # Example
///
/// ```
/// use meater_rust_ble::fahrenheit_to_celsius;
///
/// let celsius = fahrenheit_to_celsius(212.0);
/// assert!((celsius - 100.0).abs() < 0.001);
/// ```
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Normalize a BLE device address for comparison.
///
/// Platforms disagree on case (`d0:d9:...` vs `D0:D9:...`), so addresses are
/// compared upper-cased and trimmed.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(-40.0) - (-40.0)).abs() < 0.001);
        assert!((celsius_to_fahrenheit(22.6875) - 72.8375).abs() < 0.001);
    }

    #[test]
    fn test_fahrenheit_to_celsius() {
        assert!((fahrenheit_to_celsius(32.0) - 0.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" d0:d9:4f:83:e8:eb "), "D0:D9:4F:83:E8:EB");
        assert_eq!(normalize_address("D0:D9:4F:83:E8:EB"), "D0:D9:4F:83:E8:EB");
    }
}
