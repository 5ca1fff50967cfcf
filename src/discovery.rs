//! Probe discovery.
//!
//! Thin wrapper over the transport's scan capability, filtered by GATT
//! service. Produces addresses for [`ProbeSession`](crate::ProbeSession)
//! construction.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ble::transport::Transport;
use crate::ble::uuids::MEATER_SERVICE_UUID;
use crate::error::{Error, Result};

/// Finds probes in range through a [`Transport`].
pub struct DiscoveryGateway {
    transport: Arc<dyn Transport>,
}

impl DiscoveryGateway {
    /// Default scan window (5 seconds).
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a gateway on `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Scan for `timeout` and return the addresses advertising `service`.
    ///
    /// An empty list means nothing matched; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the scan itself failed.
    pub async fn discover(&self, service: Uuid, timeout: Duration) -> Result<Vec<String>> {
        let addresses = self
            .transport
            .scan(service, timeout)
            .await
            .map_err(|e| match e {
                Error::Discovery { .. } => e,
                other => Error::Discovery {
                    reason: other.to_string(),
                },
            })?;

        if addresses.is_empty() {
            warn!("No devices in range offering service {}", service);
        } else {
            info!("Discovered {} device(s): {:?}", addresses.len(), addresses);
        }

        Ok(addresses)
    }

    /// Scan for MEATER probes.
    pub async fn discover_probes(&self, timeout: Duration) -> Result<Vec<String>> {
        self.discover(MEATER_SERVICE_UUID, timeout).await
    }
}
