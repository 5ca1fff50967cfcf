//! In-memory transport for exercising sessions and fleets without a radio.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::ble::locator::{CharacteristicLayout, Locator};
use crate::ble::transport::{CharacteristicHandle, Link, Transport};
use crate::error::{Error, Result};

/// Temperature payload recorded from a real probe (tip 22.6875 °C).
pub(crate) const REFERENCE_TEMPERATURES: [u8; 8] = [0x63, 0x01, 0x2b, 0x00, 0x25, 0x00, 0x20, 0x00];

const DEVICE_NAME: u64 = 0;
const FIRMWARE_REVISION: u64 = 1;
const TEMPERATURES: u64 = 2;
const BATTERY: u64 = 3;

/// What a scripted probe exposes. `None` means the characteristic is absent.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedProbe {
    pub device_name: Option<&'static str>,
    pub firmware_revision: Option<&'static str>,
    pub temperatures: Option<Vec<u8>>,
    pub battery: Option<Vec<u8>>,
}

impl ScriptedProbe {
    pub fn healthy() -> Self {
        Self {
            device_name: Some("MEATER"),
            firmware_revision: Some("v1.0.5_0"),
            temperatures: Some(REFERENCE_TEMPERATURES.to_vec()),
            battery: Some(vec![0x0a, 0x00]),
        }
    }
}

struct ProbeEntry {
    probe: ScriptedProbe,
    alive: bool,
    fail_reads: bool,
    reads: usize,
}

/// Transport backed by scripted probes keyed by address.
pub(crate) struct ScriptedTransport {
    layout: CharacteristicLayout,
    probes: Mutex<HashMap<String, ProbeEntry>>,
    links: Mutex<HashMap<Link, String>>,
    next_link_id: AtomicU64,
    scan_results: Mutex<Vec<String>>,
    scan_error: Mutex<Option<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::with_layout(CharacteristicLayout::default())
    }

    pub fn with_layout(layout: CharacteristicLayout) -> Self {
        Self {
            layout,
            probes: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            next_link_id: AtomicU64::new(1),
            scan_results: Mutex::new(Vec::new()),
            scan_error: Mutex::new(None),
        }
    }

    pub fn add_probe(&self, address: &str, probe: ScriptedProbe) {
        self.probes.lock().insert(
            address.to_string(),
            ProbeEntry {
                probe,
                alive: true,
                fail_reads: false,
                reads: 0,
            },
        );
    }

    pub fn set_alive(&self, address: &str, alive: bool) {
        if let Some(entry) = self.probes.lock().get_mut(address) {
            entry.alive = alive;
        }
    }

    pub fn set_fail_reads(&self, address: &str, fail: bool) {
        if let Some(entry) = self.probes.lock().get_mut(address) {
            entry.fail_reads = fail;
        }
    }

    pub fn set_temperatures(&self, address: &str, payload: Vec<u8>) {
        if let Some(entry) = self.probes.lock().get_mut(address) {
            entry.probe.temperatures = Some(payload);
        }
    }

    pub fn set_scan_results(&self, addresses: Vec<String>) {
        *self.scan_results.lock() = addresses;
    }

    pub fn fail_scan(&self, reason: &str) {
        *self.scan_error.lock() = Some(reason.to_string());
    }

    /// Number of characteristic reads attempted against `address`.
    pub fn reads(&self, address: &str) -> usize {
        self.probes
            .lock()
            .get(address)
            .map(|entry| entry.reads)
            .unwrap_or(0)
    }

    pub fn open_links(&self) -> usize {
        self.links.lock().len()
    }

    fn address_for(&self, link: Link) -> Result<String> {
        self.links.lock().get(&link).cloned().ok_or(Error::NotConnected)
    }

    fn slot_for(&self, locator: Locator) -> Option<u64> {
        if locator == self.layout.device_name {
            Some(DEVICE_NAME)
        } else if locator == self.layout.firmware_revision {
            Some(FIRMWARE_REVISION)
        } else if locator == self.layout.temperatures {
            Some(TEMPERATURES)
        } else if locator == self.layout.battery {
            Some(BATTERY)
        } else {
            None
        }
    }
}

fn payload(probe: &ScriptedProbe, slot: u64) -> Option<Vec<u8>> {
    match slot {
        DEVICE_NAME => probe.device_name.map(|s| s.as_bytes().to_vec()),
        FIRMWARE_REVISION => probe.firmware_revision.map(|s| s.as_bytes().to_vec()),
        TEMPERATURES => probe.temperatures.clone(),
        BATTERY => probe.battery.clone(),
        _ => None,
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, address: &str) -> Result<Link> {
        if !self.probes.lock().contains_key(address) {
            return Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: "device not in range".to_string(),
            });
        }

        let link = Link::new(self.next_link_id.fetch_add(1, Ordering::SeqCst));
        self.links.lock().insert(link, address.to_string());
        if let Some(entry) = self.probes.lock().get_mut(address) {
            entry.alive = true;
        }
        Ok(link)
    }

    async fn resolve_characteristic(
        &self,
        link: Link,
        locator: Locator,
    ) -> Result<CharacteristicHandle> {
        let address = self.address_for(link)?;
        let probes = self.probes.lock();
        let entry = probes.get(&address).ok_or(Error::NotConnected)?;

        self.slot_for(locator)
            .filter(|slot| payload(&entry.probe, *slot).is_some())
            .map(CharacteristicHandle::new)
            .ok_or_else(|| Error::CharacteristicNotFound {
                locator: locator.to_string(),
            })
    }

    async fn read_characteristic(&self, link: Link, handle: CharacteristicHandle) -> Result<Bytes> {
        let address = self.address_for(link)?;
        let mut probes = self.probes.lock();
        let entry = probes.get_mut(&address).ok_or(Error::NotConnected)?;
        entry.reads += 1;

        if !entry.alive {
            return Err(Error::NotConnected);
        }
        if entry.fail_reads {
            return Err(Error::InvalidData {
                context: "scripted read failure".to_string(),
            });
        }

        payload(&entry.probe, handle.id())
            .map(Bytes::from)
            .ok_or_else(|| Error::InvalidData {
                context: format!("unknown handle {}", handle.id()),
            })
    }

    async fn is_link_alive(&self, link: Link) -> bool {
        let Ok(address) = self.address_for(link) else {
            return false;
        };
        self.probes
            .lock()
            .get(&address)
            .map(|entry| entry.alive)
            .unwrap_or(false)
    }

    async fn disconnect(&self, link: Link) -> Result<()> {
        self.links.lock().remove(&link);
        Ok(())
    }

    async fn scan(&self, _service: Uuid, _timeout: Duration) -> Result<Vec<String>> {
        if let Some(reason) = self.scan_error.lock().clone() {
            return Err(Error::Discovery { reason });
        }
        Ok(self.scan_results.lock().clone())
    }
}
