//! Error types for the meater-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Failed to establish a usable connection to the probe.
    ///
    /// Raised when the link cannot be opened or when one of the mandatory
    /// characteristics (temperatures, battery) cannot be resolved.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// Address of the probe.
        address: String,
        /// Description of why the connection failed.
        reason: String,
    },

    /// Operation requires a connection but the probe is not connected.
    #[error("Probe not connected")]
    NotConnected,

    /// The connection to the probe was lost.
    #[error("Connection lost")]
    ConnectionLost,

    /// A characteristic locator did not resolve on the device.
    #[error("Characteristic not found: {locator}")]
    CharacteristicNotFound {
        /// The locator that failed to resolve.
        locator: String,
    },

    /// A single characteristic read failed.
    #[error("Reading {characteristic} from {address} failed: {reason}")]
    ReadFailed {
        /// Address of the probe.
        address: String,
        /// Name of the characteristic being read.
        characteristic: String,
        /// Description of the failure.
        reason: String,
    },

    /// A payload had the wrong length for its decoder.
    #[error("Malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Number of bytes the decoder requires.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// Scanning for probes failed.
    #[error("Discovery failed: {reason}")]
    Discovery {
        /// Description of the failure.
        reason: String,
    },

    /// Discovery completed but no device offered the probe service.
    #[error("No devices in range offering service {service}")]
    NoProbesFound {
        /// The service UUID that was searched for.
        service: String,
    },

    /// The fleet has no connected probes to poll.
    #[error("No probes connected")]
    EmptyFleet,

    /// A transport operation did not complete in time.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// Invalid data was received from the probe.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// The requested operation is not supported.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the unsupported operation.
        operation: String,
    },
}

impl Error {
    /// Whether this error means the link to the probe is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost)
    }

    /// Whether this error only affects the current poll cycle.
    ///
    /// Per-session errors are transient; discovery and adapter errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed { .. }
                | Self::MalformedPayload { .. }
                | Self::Timeout { .. }
                | Self::InvalidData { .. }
                | Self::NotConnected
                | Self::ConnectionLost
                | Self::ConnectionFailed { .. }
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
