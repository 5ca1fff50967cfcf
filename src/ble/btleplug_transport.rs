//! [`Transport`] implementation on top of `btleplug`.
//!
//! Links map to connected `btleplug` peripherals; resolved characteristics
//! are cached per link so reads never repeat the service walk.

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::locator::Locator;
use crate::ble::transport::{CharacteristicHandle, Link, Transport};
use crate::error::{Error, Result};
use crate::utils::normalize_address;

/// Interval between adapter polls while looking up an unknown address.
const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// State for one open link.
struct LinkEntry {
    /// Address the link was opened for.
    address: String,
    /// The connected peripheral.
    peripheral: Peripheral,
    /// Characteristics resolved on this link, indexed by handle id.
    resolved: Vec<Characteristic>,
}

/// An adapter scan that is stopped when this guard goes away, including
/// when the future running it is dropped.
struct ActiveScan {
    adapter: Adapter,
    running: bool,
}

impl ActiveScan {
    async fn start(adapter: &Adapter, filter: ScanFilter) -> Result<Self> {
        adapter.start_scan(filter).await?;
        Ok(Self {
            adapter: adapter.clone(),
            running: true,
        })
    }

    async fn stop(mut self) {
        self.running = false;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        if !self.running {
            return;
        }

        let adapter = self.adapter.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = adapter.stop_scan().await {
                        warn!("Failed to stop abandoned scan: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to stop abandoned scan"),
        }
    }
}

/// BLE transport backed by the platform's `btleplug` adapter.
pub struct BtleplugTransport {
    /// The BLE adapter to use.
    adapter: Adapter,
    /// Open links.
    links: RwLock<HashMap<Link, LinkEntry>>,
    /// Link id counter.
    next_link_id: AtomicU64,
    /// How long to scan for an address the adapter has not seen yet.
    lookup_timeout: Duration,
}

impl BtleplugTransport {
    /// Default time spent looking for an address before connecting fails.
    ///
    /// Kept below the session's operation timeout so the lookup reports
    /// its own error instead of being cut off.
    pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a transport on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            links: RwLock::new(HashMap::new()),
            next_link_id: AtomicU64::new(1),
            lookup_timeout: Self::DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Set how long `connect` scans for an address the adapter has not seen.
    pub fn set_lookup_timeout(&mut self, timeout: Duration) {
        self.lookup_timeout = timeout;
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Number of currently open links.
    pub fn link_count(&self) -> usize {
        self.links.read().len()
    }

    /// Find a peripheral the adapter already knows by address or platform id.
    async fn known_peripheral(&self, wanted: &str) -> Result<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await?;

        Ok(peripherals.into_iter().find(|p| {
            normalize_address(&p.address().to_string()) == wanted
                || normalize_address(&p.id().to_string()) == wanted
        }))
    }

    /// Find a peripheral, scanning briefly if the adapter has not seen it.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let wanted = normalize_address(address);

        if let Some(peripheral) = self.known_peripheral(&wanted).await? {
            return Ok(peripheral);
        }

        debug!("{} not known to adapter, scanning", address);
        let scan = ActiveScan::start(&self.adapter, ScanFilter::default()).await?;

        let deadline = Instant::now() + self.lookup_timeout;
        let found = loop {
            if let Some(peripheral) = self.known_peripheral(&wanted).await? {
                break Some(peripheral);
            }
            if Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(LOOKUP_POLL_INTERVAL).await;
        };

        scan.stop().await;

        found.ok_or_else(|| Error::ConnectionFailed {
            address: address.to_string(),
            reason: format!("device not seen within {:?}", self.lookup_timeout),
        })
    }

    /// Clone the peripheral behind a link.
    fn peripheral(&self, link: Link) -> Result<Peripheral> {
        self.links
            .read()
            .get(&link)
            .map(|entry| entry.peripheral.clone())
            .ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn connect(&self, address: &str) -> Result<Link> {
        let peripheral = self.find_peripheral(address).await?;

        let already_connected = peripheral.is_connected().await.unwrap_or(false);
        if !already_connected {
            peripheral
                .connect()
                .await
                .map_err(|e| Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        } else {
            info!("Peripheral {} already connected at BLE level", address);
        }

        if let Err(e) = peripheral.discover_services().await {
            if !already_connected {
                if let Err(close_err) = peripheral.disconnect().await {
                    debug!("Disconnecting {} after failed discovery: {}", address, close_err);
                }
            }
            return Err(e.into());
        }

        let link = Link::new(self.next_link_id.fetch_add(1, Ordering::SeqCst));
        debug!(
            "Opened {} to {} ({} characteristics)",
            link,
            address,
            peripheral.characteristics().len()
        );

        self.links.write().insert(
            link,
            LinkEntry {
                address: address.to_string(),
                peripheral,
                resolved: Vec::new(),
            },
        );

        Ok(link)
    }

    async fn resolve_characteristic(
        &self,
        link: Link,
        locator: Locator,
    ) -> Result<CharacteristicHandle> {
        let uuid = match locator {
            Locator::ByUuid(uuid) => uuid,
            Locator::ByHandle(_) => {
                return Err(Error::NotSupported {
                    operation: format!("resolving {} (btleplug addresses by UUID)", locator),
                })
            }
        };

        let mut links = self.links.write();
        let entry = links.get_mut(&link).ok_or(Error::NotConnected)?;

        let characteristic = entry
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::CharacteristicNotFound {
                locator: locator.to_string(),
            })?;

        debug!(
            "Resolved {} on {} (properties: {:?})",
            locator, entry.address, characteristic.properties
        );

        entry.resolved.push(characteristic);
        Ok(CharacteristicHandle::new((entry.resolved.len() - 1) as u64))
    }

    async fn read_characteristic(&self, link: Link, handle: CharacteristicHandle) -> Result<Bytes> {
        let (peripheral, characteristic) = {
            let links = self.links.read();
            let entry = links.get(&link).ok_or(Error::NotConnected)?;
            let characteristic = entry
                .resolved
                .get(handle.id() as usize)
                .cloned()
                .ok_or_else(|| Error::InvalidData {
                    context: format!("unknown characteristic handle {}", handle.id()),
                })?;
            (entry.peripheral.clone(), characteristic)
        };

        let data = peripheral.read(&characteristic).await?;

        trace!(
            "Read {} bytes from characteristic {}",
            data.len(),
            characteristic.uuid
        );

        Ok(Bytes::from(data))
    }

    async fn is_link_alive(&self, link: Link) -> bool {
        match self.peripheral(link) {
            Ok(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn disconnect(&self, link: Link) -> Result<()> {
        let entry = self.links.write().remove(&link);

        match entry {
            Some(entry) => {
                entry.peripheral.disconnect().await?;
                info!("Disconnected from {}", entry.address);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn scan(&self, service: Uuid, timeout: Duration) -> Result<Vec<String>> {
        info!("Scanning {:?} for service {}", timeout, service);

        let active = ActiveScan::start(
            &self.adapter,
            ScanFilter {
                services: vec![service],
            },
        )
        .await
        .map_err(|e| Error::Discovery {
            reason: e.to_string(),
        })?;

        tokio::time::sleep(timeout).await;
        active.stop().await;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| Error::Discovery {
                reason: e.to_string(),
            })?;

        let mut addresses: Vec<String> = Vec::new();
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                _ => continue,
            };

            // Not every backend honours the scan filter.
            if !properties.services.contains(&service) {
                trace!("Skipping {} without service", peripheral.address());
                continue;
            }

            let address = peripheral.address().to_string();
            if !addresses.contains(&address) {
                debug!("Found {} ({:?})", address, properties.local_name);
                addresses.push(address);
            }
        }

        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BtleplugTransport>();
    }

    #[test]
    fn test_lookup_finishes_inside_operation_timeout() {
        let lookup = BtleplugTransport::DEFAULT_LOOKUP_TIMEOUT;
        let operation = crate::session::ProbeSession::DEFAULT_OPERATION_TIMEOUT;
        assert!(lookup < operation);
    }
}
