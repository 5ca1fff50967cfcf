//! Fleet poller for reading many probes in one loop.
//!
//! The poller owns an ordered list of [`ProbeSession`]s and reads them one at
//! a time. A probe that fails or drops its link is reported and skipped for
//! the cycle; it never stops the others from being read.

use futures::future::join_all;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::locator::CharacteristicLayout;
use crate::ble::transport::Transport;
use crate::ble::uuids::MEATER_SERVICE_UUID;
use crate::data::ProbeRecord;
use crate::discovery::DiscoveryGateway;
use crate::error::{Error, Result};
use crate::session::ProbeSession;

/// What to do with a session found disconnected at the start of its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Skip it every cycle.
    #[default]
    Never,
    /// Try to connect again before reading.
    OnNextCycle,
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Pause after each probe read.
    pub poll_interval: Duration,
    /// Upper bound on any single connect or read.
    pub operation_timeout: Duration,
    /// Reconnection policy for dropped sessions.
    pub reconnect: ReconnectPolicy,
    /// Characteristic layout for new sessions.
    pub layout: CharacteristicLayout,
}

impl FleetConfig {
    /// Set the per-probe pause.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the reconnection policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the characteristic layout.
    pub fn with_layout(mut self, layout: CharacteristicLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            operation_timeout: ProbeSession::DEFAULT_OPERATION_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            layout: CharacteristicLayout::default(),
        }
    }
}

/// Why a session was skipped this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The link was down.
    Disconnected,
    /// A read failed; the message describes the error.
    ReadFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::ReadFailed(reason) => write!(f, "read failed: {}", reason),
        }
    }
}

/// Result of polling one session.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Both reads succeeded.
    Updated(ProbeRecord),
    /// The session was skipped this cycle.
    Skipped {
        /// Address of the skipped probe.
        address: String,
        /// Device name, if known.
        device_name: Option<String>,
        /// Why it was skipped.
        reason: SkipReason,
    },
}

impl PollOutcome {
    /// Address of the probe this outcome is for.
    pub fn address(&self) -> &str {
        match self {
            Self::Updated(record) => &record.address,
            Self::Skipped { address, .. } => address,
        }
    }

    /// Whether the probe was read successfully.
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

/// Drives the read cycle across a fleet of probes.
pub struct FleetPoller {
    /// Transport shared by every session.
    transport: Arc<dyn Transport>,
    /// Configuration.
    config: FleetConfig,
    /// Live sessions, in insertion order.
    sessions: RwLock<Vec<Arc<ProbeSession>>>,
    /// Poll outcome channel.
    outcome_tx: broadcast::Sender<PollOutcome>,
}

impl FleetPoller {
    /// Create an empty poller.
    pub fn new(transport: Arc<dyn Transport>, config: FleetConfig) -> Self {
        let (outcome_tx, _) = broadcast::channel(64);

        Self {
            transport,
            config,
            sessions: RwLock::new(Vec::new()),
            outcome_tx,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Connect to `address` and add it to the fleet.
    ///
    /// # Errors
    ///
    /// Returns the connection error; the address is not added.
    pub async fn add(&self, address: &str) -> Result<Arc<ProbeSession>> {
        let session = Arc::new(
            ProbeSession::new(address, self.transport.clone())
                .with_layout(self.config.layout)
                .with_timeout(self.config.operation_timeout),
        );

        match session.connect().await {
            Ok(()) => {
                info!("Connected to {}", address);
                self.sessions.write().push(session.clone());
                Ok(session)
            }
            Err(e) => {
                warn!("Failed to connect to {}. Error: {}", address, e);
                Err(e)
            }
        }
    }

    /// Connect to every address in order, keeping the ones that succeed.
    ///
    /// Returns the number of probes added.
    pub async fn connect_all<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for address in addresses {
            if self.add(address.as_ref()).await.is_ok() {
                added += 1;
            }
        }
        added
    }

    /// Discover probes in range and connect to them.
    ///
    /// # Errors
    ///
    /// - [`Error::Discovery`] if scanning failed
    /// - [`Error::NoProbesFound`] if no probe answered
    /// - [`Error::EmptyFleet`] if none of them could be connected
    pub async fn connect_discovered(&self, timeout: Duration) -> Result<usize> {
        let gateway = DiscoveryGateway::new(self.transport.clone());
        let addresses = gateway.discover_probes(timeout).await?;

        if addresses.is_empty() {
            return Err(Error::NoProbesFound {
                service: MEATER_SERVICE_UUID.to_string(),
            });
        }

        match self.connect_all(&addresses).await {
            0 => Err(Error::EmptyFleet),
            added => Ok(added),
        }
    }

    /// Remove a probe from the fleet, returning its session.
    pub fn remove(&self, address: &str) -> Option<Arc<ProbeSession>> {
        let mut sessions = self.sessions.write();
        let index = sessions.iter().position(|s| s.address() == address)?;
        Some(sessions.remove(index))
    }

    /// Get the sessions in fleet order.
    pub fn sessions(&self) -> Vec<Arc<ProbeSession>> {
        self.sessions.read().clone()
    }

    /// Number of sessions in the fleet.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the fleet is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Subscribe to poll outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<PollOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Poll a single session: check the link, then read temperatures and
    /// battery. Failures are logged and reported, never returned.
    pub async fn poll_session(&self, session: &ProbeSession) -> PollOutcome {
        let outcome = self.read_session(session).await;
        let _ = self.outcome_tx.send(outcome.clone());
        outcome
    }

    /// Poll every session once, in fleet order, without pausing.
    pub async fn poll_once(&self) -> Vec<PollOutcome> {
        let sessions = self.sessions();
        let mut outcomes = Vec::with_capacity(sessions.len());

        for session in sessions {
            outcomes.push(self.poll_session(&session).await);
        }

        outcomes
    }

    /// Poll continuously, pausing `interval` after every probe.
    ///
    /// Only returns on error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyFleet`] if there is nothing to poll.
    pub async fn run_forever(&self, interval: Duration) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyFleet);
        }

        info!("Polling {} probe(s), {:?} apart", self.len(), interval);

        loop {
            let sessions = self.sessions();
            if sessions.is_empty() {
                return Err(Error::EmptyFleet);
            }

            for session in sessions {
                self.poll_session(&session).await;
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Poll with the configured interval until `shutdown` completes.
    ///
    /// A read in flight when `shutdown` fires is abandoned; cached readings
    /// keep their last committed values.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run_forever(self.config.poll_interval) => result,
            _ = shutdown => {
                info!("Polling stopped");
                Ok(())
            }
        }
    }

    /// Disconnect every probe and empty the fleet.
    pub async fn shutdown(&self) {
        info!("Shutting down fleet poller");

        let sessions: Vec<_> = self.sessions.write().drain(..).collect();
        let results = join_all(sessions.iter().map(|session| session.disconnect())).await;

        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!("Error disconnecting probe {}: {}", session.address(), e);
            }
        }
    }

    async fn read_session(&self, session: &ProbeSession) -> PollOutcome {
        if !session.is_connected().await && !self.try_reconnect(session).await {
            warn!(
                "Ignoring disconnected device {} ({})",
                session.address(),
                session.identity().device_name_or_empty()
            );
            return Self::skipped(session, SkipReason::Disconnected);
        }

        let result = async {
            session.read_temperatures().await?;
            session.read_battery().await?;
            Ok::<_, Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                let record = session.record();
                debug!("Updated {}", record.address);
                PollOutcome::Updated(record)
            }
            Err(e) => {
                warn!("Failed to read from device {}. Error: {}", session.address(), e);
                if e.is_disconnect() {
                    Self::skipped(session, SkipReason::Disconnected)
                } else {
                    Self::skipped(session, SkipReason::ReadFailed(e.to_string()))
                }
            }
        }
    }

    async fn try_reconnect(&self, session: &ProbeSession) -> bool {
        if self.config.reconnect != ReconnectPolicy::OnNextCycle {
            return false;
        }

        info!("Reconnecting to {}", session.address());
        match session.connect().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Reconnect to {} failed: {}", session.address(), e);
                false
            }
        }
    }

    fn skipped(session: &ProbeSession, reason: SkipReason) -> PollOutcome {
        PollOutcome::Skipped {
            address: session.address().to_string(),
            device_name: session.device_name(),
            reason,
        }
    }
}

impl std::fmt::Debug for FleetPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetPoller")
            .field("sessions", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
