//! Probe identity.

/// Who a probe is: its address plus what it reported about itself at
/// connect time.
///
/// Device name and firmware revision are read best-effort and stay `None`
/// when the probe did not answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeIdentity {
    /// BLE address the session was created for.
    pub address: String,
    /// Hardware model name (Device Name characteristic).
    pub device_name: Option<String>,
    /// Firmware revision string.
    pub firmware_revision: Option<String>,
}

impl ProbeIdentity {
    /// Identity holding only an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            device_name: None,
            firmware_revision: None,
        }
    }

    /// Device name, or an empty string when unknown.
    pub fn device_name_or_empty(&self) -> &str {
        self.device_name.as_deref().unwrap_or("")
    }

    /// Firmware revision, or an empty string when unknown.
    pub fn firmware_revision_or_empty(&self) -> &str {
        self.firmware_revision.as_deref().unwrap_or("")
    }
}
