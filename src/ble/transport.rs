//! Transport abstraction over a BLE central stack.
//!
//! Sessions and discovery only talk to the radio through [`Transport`], which
//! keeps the protocol core independent of the platform backend. The default
//! backend is [`BtleplugTransport`](crate::ble::BtleplugTransport).

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::locator::Locator;
use crate::error::Result;

/// An established connection to one peripheral.
///
/// Links are opaque tokens issued by a transport; they carry no state of
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link(u64);

impl Link {
    /// Create a link token. Only transports should mint these.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The transport-assigned identifier.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A characteristic resolved on a specific link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle(u64);

impl CharacteristicHandle {
    /// Create a handle token. Only transports should mint these.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The transport-assigned identifier.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Capabilities the probe core needs from a BLE stack.
///
/// Every method is a suspension point; callers apply their own timeouts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to the peripheral at `address`.
    async fn connect(&self, address: &str) -> Result<Link>;

    /// Resolve a characteristic locator on an open link.
    async fn resolve_characteristic(
        &self,
        link: Link,
        locator: Locator,
    ) -> Result<CharacteristicHandle>;

    /// Read the current value of a resolved characteristic.
    async fn read_characteristic(&self, link: Link, handle: CharacteristicHandle) -> Result<Bytes>;

    /// Query whether the link is still up.
    async fn is_link_alive(&self, link: Link) -> bool;

    /// Close a link. Closing an unknown or already closed link is not an error.
    async fn disconnect(&self, link: Link) -> Result<()>;

    /// Scan for peripherals advertising `service` for `timeout`.
    ///
    /// Returns the addresses seen, empty when none matched.
    async fn scan(&self, service: Uuid, timeout: Duration) -> Result<Vec<String>>;
}
