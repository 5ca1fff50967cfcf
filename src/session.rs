//! Probe session.
//!
//! A [`ProbeSession`] owns one physical probe: its address, the link the
//! transport opened for it, the resolved characteristic handles, and the
//! cached reading. Reads pull bytes through the [`Transport`] and decode
//! them with the protocol codec.

use bytes::Bytes;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ble::connection::ConnectionState;
use crate::ble::locator::{CharacteristicLayout, Locator};
use crate::ble::transport::{CharacteristicHandle, Link, Transport};
use crate::data::{ProbeIdentity, ProbeReading, ProbeRecord};
use crate::error::{Error, Result};
use crate::protocol::{decode_battery_payload, decode_temperature_payload, DecodedTemperatures};

/// Handles for the characteristics every read cycle needs.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    temperatures: CharacteristicHandle,
    battery: CharacteristicHandle,
}

/// Connection bookkeeping for a session.
#[derive(Debug, Default)]
struct SessionState {
    connection: ConnectionState,
    link: Option<Link>,
    resolved: Option<Resolved>,
}

/// Resets a session to `Disconnected` if a connect attempt is dropped midway,
/// closing any link the attempt had already opened.
struct ConnectAttempt<'a> {
    state: &'a RwLock<SessionState>,
    transport: &'a Arc<dyn Transport>,
    link: Option<Link>,
    armed: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        {
            let mut state = self.state.write();
            if state.connection == ConnectionState::Connecting {
                state.connection = ConnectionState::Disconnected;
            }
        }

        if let Some(link) = self.link.take() {
            let transport = self.transport.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = transport.disconnect(link).await {
                            debug!("Closing abandoned {}: {}", link, e);
                        }
                    });
                }
                Err(_) => warn!("No runtime to close abandoned {}", link),
            }
        }
    }
}

/// A connection to a single MEATER probe and its cached telemetry.
pub struct ProbeSession {
    /// BLE address.
    address: String,
    /// Transport the session reads through.
    transport: Arc<dyn Transport>,
    /// How the characteristics are addressed.
    layout: CharacteristicLayout,
    /// Upper bound on any single transport operation.
    operation_timeout: Duration,
    /// Connection state.
    state: RwLock<SessionState>,
    /// Identity, fixed by the first successful connect.
    identity: OnceLock<ProbeIdentity>,
    /// Latest reading.
    reading: RwLock<ProbeReading>,
}

impl ProbeSession {
    /// Default per-operation timeout (10 seconds).
    pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a disconnected session for `address`.
    pub fn new(address: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            address: address.into(),
            transport,
            layout: CharacteristicLayout::default(),
            operation_timeout: Self::DEFAULT_OPERATION_TIMEOUT,
            state: RwLock::new(SessionState::default()),
            identity: OnceLock::new(),
            reading: RwLock::new(ProbeReading::new()),
        }
    }

    /// Use a different characteristic layout.
    pub fn with_layout(mut self, layout: CharacteristicLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Use a different per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    // === Connection ===

    /// Open a link and resolve the probe's characteristics.
    ///
    /// Device name and firmware revision are read best-effort; failing to
    /// read them is logged and does not fail the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the link cannot be opened or
    /// the temperature or battery characteristic does not resolve.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.write();

            if state.connection.is_connected() {
                debug!("{} already connected", self.address);
                return Ok(());
            }

            if state.connection.is_transitioning() {
                return Err(Error::ConnectionFailed {
                    address: self.address.clone(),
                    reason: "Connection already in progress".to_string(),
                });
            }

            state.connection = ConnectionState::Connecting;
        }

        let mut attempt = ConnectAttempt {
            state: &self.state,
            transport: &self.transport,
            link: None,
            armed: true,
        };

        info!("Connecting to probe {}", self.address);

        let link = self
            .timed("connect", self.transport.connect(&self.address))
            .await
            .map_err(|e| self.connection_failed(e))?;
        attempt.link = Some(link);

        let established = self.resolve_and_identify(link).await;
        let (resolved, identity) = match established {
            Ok(parts) => parts,
            Err(e) => {
                attempt.link = None;
                if let Err(close_err) = self.transport.disconnect(link).await {
                    debug!("Closing {} after failed setup: {}", link, close_err);
                }
                return Err(e);
            }
        };

        if self.identity.set(identity).is_err() {
            debug!("Keeping identity from first connection to {}", self.address);
        }

        {
            let mut state = self.state.write();
            state.connection = ConnectionState::Connected;
            state.link = Some(link);
            state.resolved = Some(resolved);
        }
        attempt.link = None;
        attempt.armed = false;

        info!(
            "Connected to probe {} ({})",
            self.address,
            self.identity().device_name_or_empty()
        );

        Ok(())
    }

    /// Close the link to the probe.
    pub async fn disconnect(&self) -> Result<()> {
        let link = {
            let mut state = self.state.write();
            state.resolved = None;
            let link = state.link.take();
            match link {
                Some(link) => {
                    state.connection = ConnectionState::Disconnecting;
                    link
                }
                None => {
                    state.connection = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        };

        let result = self.transport.disconnect(link).await;
        self.state.write().connection = ConnectionState::Disconnected;

        match &result {
            Ok(()) => info!("Disconnected from probe {}", self.address),
            Err(e) => warn!("Error disconnecting from {}: {}", self.address, e),
        }

        result
    }

    /// Check the live link state with the transport.
    ///
    /// A link found dead moves the session to `Disconnected`.
    pub async fn is_connected(&self) -> bool {
        let link = {
            let state = self.state.read();
            if !state.connection.is_connected() {
                return false;
            }
            state.link
        };

        let Some(link) = link else {
            return false;
        };

        if self.link_alive(link).await {
            true
        } else {
            self.drop_link(link).await;
            false
        }
    }

    /// Get the last known connection state without touching the transport.
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection
    }

    // === Reads ===

    /// Read and decode the temperature characteristic.
    ///
    /// The cached reading is only updated after a complete decode.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session has no link
    /// - [`Error::ConnectionLost`] if the link dropped during the read
    /// - [`Error::ReadFailed`] or [`Error::Timeout`] if the read failed
    /// - [`Error::MalformedPayload`] if the payload is not 8 bytes
    pub async fn read_temperatures(&self) -> Result<DecodedTemperatures> {
        let (link, resolved) = self.connected()?;
        let data = self
            .read_bytes(link, resolved.temperatures, "temperatures")
            .await?;

        let decoded = decode_temperature_payload(&data)?;
        self.reading
            .write()
            .record_temperatures(decoded, Instant::now());

        debug!(
            "{}: tip {:.4}°C ambient {:.4}°C diagnostic {}",
            self.address, decoded.tip_celsius, decoded.ambient_celsius, decoded.diagnostic_raw
        );

        Ok(decoded)
    }

    /// Read and decode the battery characteristic, in percent.
    ///
    /// # Errors
    ///
    /// Same as [`read_temperatures`](Self::read_temperatures), with a
    /// minimum payload of 2 bytes.
    pub async fn read_battery(&self) -> Result<i32> {
        let (link, resolved) = self.connected()?;
        let data = self.read_bytes(link, resolved.battery, "battery").await?;

        let percent = decode_battery_payload(&data)?;
        self.reading.write().record_battery(percent, Instant::now());

        debug!("{}: battery {}%", self.address, percent);

        Ok(percent)
    }

    // === Identification ===

    /// Get the BLE address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the probe identity. Name and firmware are `None` before the
    /// first successful connect.
    pub fn identity(&self) -> ProbeIdentity {
        self.identity
            .get()
            .cloned()
            .unwrap_or_else(|| ProbeIdentity::new(self.address.clone()))
    }

    /// Get the hardware model name.
    pub fn device_name(&self) -> Option<String> {
        self.identity.get().and_then(|i| i.device_name.clone())
    }

    /// Get the firmware revision.
    pub fn firmware_revision(&self) -> Option<String> {
        self.identity.get().and_then(|i| i.firmware_revision.clone())
    }

    /// Get the characteristic layout in use.
    pub fn layout(&self) -> &CharacteristicLayout {
        &self.layout
    }

    // === Telemetry ===

    /// Get a copy of the latest reading.
    pub fn reading(&self) -> ProbeReading {
        self.reading.read().clone()
    }

    /// Tip temperature in Celsius.
    pub fn tip_celsius(&self) -> Option<f64> {
        self.reading.read().tip_celsius()
    }

    /// Ambient temperature in Celsius.
    pub fn ambient_celsius(&self) -> Option<f64> {
        self.reading.read().ambient_celsius()
    }

    /// Tip temperature in Fahrenheit.
    pub fn tip_fahrenheit(&self) -> Option<f64> {
        self.reading.read().tip_fahrenheit()
    }

    /// Ambient temperature in Fahrenheit.
    pub fn ambient_fahrenheit(&self) -> Option<f64> {
        self.reading.read().ambient_fahrenheit()
    }

    /// Battery level in percent.
    pub fn battery_percent(&self) -> Option<i32> {
        self.reading.read().battery_percent()
    }

    /// Opaque diagnostic word.
    pub fn diagnostic_raw(&self) -> Option<i16> {
        self.reading.read().diagnostic_raw()
    }

    /// Monotonic time of the last successful read.
    pub fn last_update(&self) -> Option<Instant> {
        self.reading.read().last_update()
    }

    /// Time since the last successful read.
    pub fn data_age(&self) -> Option<Duration> {
        self.reading.read().age()
    }

    /// Snapshot identity and reading into a record.
    pub fn record(&self) -> ProbeRecord {
        let identity = self.identity();
        let reading = self.reading.read();
        ProbeRecord::from_parts(&identity, &reading, Instant::now())
    }

    // === Internal ===

    /// Run a transport operation under the session's timeout.
    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: format!("{} on {}", operation, self.address),
            }),
        }
    }

    async fn link_alive(&self, link: Link) -> bool {
        tokio::time::timeout(self.operation_timeout, self.transport.is_link_alive(link))
            .await
            .unwrap_or(false)
    }

    fn connection_failed(&self, error: Error) -> Error {
        match error {
            Error::ConnectionFailed { .. } => error,
            other => Error::ConnectionFailed {
                address: self.address.clone(),
                reason: other.to_string(),
            },
        }
    }

    async fn resolve_and_identify(&self, link: Link) -> Result<(Resolved, ProbeIdentity)> {
        let temperatures = self
            .resolve(link, self.layout.temperatures)
            .await
            .map_err(|e| self.connection_failed(e))?;
        let battery = self
            .resolve(link, self.layout.battery)
            .await
            .map_err(|e| self.connection_failed(e))?;

        let device_name = self
            .read_optional_string(link, self.layout.device_name, "device name")
            .await;
        let firmware_revision = self
            .read_optional_string(link, self.layout.firmware_revision, "firmware revision")
            .await;

        let identity = ProbeIdentity {
            address: self.address.clone(),
            device_name,
            firmware_revision,
        };

        Ok((
            Resolved {
                temperatures,
                battery,
            },
            identity,
        ))
    }

    async fn resolve(&self, link: Link, locator: Locator) -> Result<CharacteristicHandle> {
        self.timed(
            "characteristic lookup",
            self.transport.resolve_characteristic(link, locator),
        )
        .await
    }

    /// Read a UTF-8 characteristic, logging and swallowing any failure.
    async fn read_optional_string(&self, link: Link, locator: Locator, what: &str) -> Option<String> {
        let result: Result<String> = async {
            let handle = self.resolve(link, locator).await?;
            let data = self
                .timed("read", self.transport.read_characteristic(link, handle))
                .await?;
            String::from_utf8(data.to_vec()).map_err(|_| Error::InvalidData {
                context: format!("Invalid UTF-8 in {}", what),
            })
        }
        .await;

        match result {
            Ok(value) => Some(value.trim_end_matches('\0').to_string()),
            Err(e) => {
                warn!("Failed to read {} from {}: {}", what, self.address, e);
                None
            }
        }
    }

    fn connected(&self) -> Result<(Link, Resolved)> {
        let state = self.state.read();
        match (state.connection, state.link, state.resolved) {
            (ConnectionState::Connected, Some(link), Some(resolved)) => Ok((link, resolved)),
            _ => Err(Error::NotConnected),
        }
    }

    async fn read_bytes(
        &self,
        link: Link,
        handle: CharacteristicHandle,
        characteristic: &str,
    ) -> Result<Bytes> {
        let result = self
            .timed("read", self.transport.read_characteristic(link, handle))
            .await;

        match result {
            Ok(data) => Ok(data),
            Err(e) => {
                if !self.link_alive(link).await {
                    warn!(
                        "{} got disconnected while reading {}: {}",
                        self.address, characteristic, e
                    );
                    self.drop_link(link).await;
                    return Err(Error::ConnectionLost);
                }

                Err(match e {
                    Error::Timeout { .. } => e,
                    other => Error::ReadFailed {
                        address: self.address.clone(),
                        characteristic: characteristic.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Forget a dead link and release it in the transport.
    async fn drop_link(&self, link: Link) {
        if !self.mark_disconnected(link) {
            return;
        }

        if let Err(e) = self.timed("disconnect", self.transport.disconnect(link)).await {
            debug!("Releasing dead {} for {}: {}", link, self.address, e);
        }
    }

    /// Returns whether `link` was still the session's current link.
    fn mark_disconnected(&self, link: Link) -> bool {
        let mut state = self.state.write();
        if state.link != Some(link) {
            return false;
        }

        state.connection = ConnectionState::Disconnected;
        state.link = None;
        state.resolved = None;
        info!("Probe {} got disconnected", self.address);
        true
    }
}

impl std::fmt::Debug for ProbeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSession")
            .field("address", &self.address)
            .field("device_name", &self.device_name())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}
