//! Connection Session Manager: the one exclusive printer connection.
//!
//! # Lifecycle
//!
//! ```text
//!               connect()                    open ok
//! Disconnected ───────────► Connecting ─────────────────► Connected
//!      ▲                        │ resolve/open error           │
//!      └────────────────────────┘                              │
//!      ▲                 disconnect() / superseded by connect()│
//!      └───────────────────────────────────────────────────────┘
//! ```
//!
//! The slot is a plain mutex that is never held across an `.await`.  Address
//! resolution, the USB permission wait, the open, every write and every
//! close run outside it, so [`ConnectionManager::is_connected`] and
//! [`ConnectionManager::active_connection`] answer immediately even while a
//! connect, send, or close is stuck in provider I/O.  Writes and closes are
//! serialised on the session's own stream lock instead.
//!
//! Two racing connects both succeed and the later install wins; the earlier
//! stream is closed at that point.  A failing connect only resets the state
//! to `Disconnected` when no newer connect has started since.
//!
//! # Address resolution
//!
//! | Interface   | Resolution                                                    |
//! |-------------|---------------------------------------------------------------|
//! | `tcp`       | `host[:port]`, port defaults to 9100                          |
//! | `bluetooth` | paired MAC → Classic (secure/insecure), otherwise LE          |
//! | `usb`       | fresh USB scan, then the OS permission dialog when needed     |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use printlink_core::{
    AddressError, AddressMatch, BluetoothSecurity, ConnectionState, Endpoint, ErrorCode,
    InterfaceType, NetworkAddress, Transport, DEFAULT_NETWORK_PORT,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::discover::DiscoveryCoordinator;
use crate::application::permissions::{MissingPermissions, PermissionGate};
use crate::application::provider::{
    ByteStream, DeviceProvider, OpenOptions, ProviderError, StatusError,
};
use crate::application::usb_permission::UsbPermissionBroker;

/// Status reported when a BLE probe connected but the printer did not answer.
pub const STATUS_UNAVAILABLE: &str = "Connected but status unavailable";

// ── Settings and requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub default_port: u16,
    /// Open timeout used when the caller supplies none.
    pub open_timeout: Duration,
    /// Bound on the USB scan that resolves an identifier to a device.
    pub usb_resolve_timeout: Duration,
    /// Bound on waiting for the user to answer the USB permission dialog.
    pub usb_permission_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_NETWORK_PORT,
            open_timeout: Duration::from_secs(10),
            usb_resolve_timeout: Duration::from_secs(5),
            usb_permission_timeout: Duration::from_secs(60),
        }
    }
}

/// A validated `connect` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub interface: InterfaceType,
    pub identifier: String,
    /// Open timeout override.
    pub timeout: Option<Duration>,
    /// Classic Bluetooth sub-variant; ignored elsewhere.
    pub security: BluetoothSecurity,
}

impl ConnectRequest {
    pub fn new(interface: InterfaceType, identifier: impl Into<String>) -> Self {
        Self {
            interface,
            identifier: identifier.into(),
            timeout: None,
            security: BluetoothSecurity::Insecure,
        }
    }
}

/// What `getActiveConnection` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    pub interface: InterfaceType,
    pub transport: Transport,
    pub address: String,
}

/// Result of a throwaway BLE connection test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleProbe {
    pub address: String,
    pub status: String,
    /// `true` when the printer answered the status query.
    pub status_available: bool,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("MAC address is required for direct BLE connection")]
    MissingMacAddress,

    #[error(transparent)]
    MissingPermissions(#[from] MissingPermissions),

    #[error("USB permission denied for {0}")]
    UsbPermissionDenied(String),

    #[error("USB permission error: {0}")]
    UsbPermissionError(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("could not create printer instance on BLE connection")]
    PrinterCreationFailed,

    #[error("BLE connection error: {0}")]
    BleConnectionError(String),

    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("not connected to a printer")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),
}

impl ConnectError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::MissingArgument(_) => ErrorCode::MissingArgument,
            ConnectError::MissingMacAddress => ErrorCode::MissingMacAddress,
            ConnectError::MissingPermissions(_) => ErrorCode::MissingPermissions,
            ConnectError::UsbPermissionDenied(_) => ErrorCode::UsbPermissionDenied,
            ConnectError::UsbPermissionError(_) => ErrorCode::UsbPermissionError,
            ConnectError::ConnectionFailed(_) => ErrorCode::ConnectionFailed,
            ConnectError::ConnectionError(_) => ErrorCode::ConnectionError,
            ConnectError::PrinterCreationFailed => ErrorCode::PrinterCreationFailed,
            ConnectError::BleConnectionError(_) => ErrorCode::BleConnectionError,
            ConnectError::DisconnectFailed(_) => ErrorCode::DisconnectFailed,
            ConnectError::NotConnected => ErrorCode::NotConnected,
            ConnectError::SendFailed(_) => ErrorCode::SendFailed,
        }
    }
}

impl From<AddressError> for ConnectError {
    fn from(_: AddressError) -> Self {
        ConnectError::MissingArgument("identifier")
    }
}

// ── Session slot ──────────────────────────────────────────────────────────────

type SharedStream = Arc<tokio::sync::Mutex<Box<dyn ByteStream>>>;

struct ActiveSession {
    interface: InterfaceType,
    endpoint: Endpoint,
    stream: SharedStream,
}

impl ActiveSession {
    fn describe(&self) -> ActiveConnection {
        ActiveConnection {
            interface: self.interface,
            transport: self.endpoint.transport(),
            address: self.endpoint.address(),
        }
    }

    /// A stream busy with a write or close still counts as open.
    fn is_open(&self) -> bool {
        self.stream.try_lock().map_or(true, |stream| stream.is_open())
    }
}

#[derive(Default)]
struct Slot {
    state: ConnectionState,
    active: Option<ActiveSession>,
    /// Bumped by every connect; tells a failing connect whether it is the latest.
    generation: u64,
}

async fn close_session(session: ActiveSession, reason: &str) {
    if let Err(e) = session.stream.lock().await.close().await {
        warn!(endpoint = %session.endpoint, "error closing {reason} connection: {e}");
    } else {
        debug!(endpoint = %session.endpoint, "closed {reason} connection");
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

pub struct ConnectionManager {
    provider: Arc<dyn DeviceProvider>,
    gate: PermissionGate,
    coordinator: Arc<DiscoveryCoordinator>,
    broker: Arc<UsbPermissionBroker>,
    settings: ConnectionSettings,
    slot: Mutex<Slot>,
}

impl ConnectionManager {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        gate: PermissionGate,
        coordinator: Arc<DiscoveryCoordinator>,
        broker: Arc<UsbPermissionBroker>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            provider,
            gate,
            coordinator,
            broker,
            settings,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        self.slot().state
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a session to `request.identifier`, replacing any current one.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ActiveConnection, ConnectError> {
        let identifier = request.identifier.trim();
        if identifier.is_empty() {
            return Err(ConnectError::MissingArgument("identifier"));
        }

        let (prior, generation) = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.state = ConnectionState::Connecting;
            (slot.active.take(), slot.generation)
        };
        if let Some(prior) = prior {
            info!(endpoint = %prior.endpoint, "closing existing connection before connect");
            close_session(prior, "previous").await;
        }

        match self.open_session(&request, identifier).await {
            Ok(session) => {
                let connection = session.describe();
                info!(endpoint = %session.endpoint, "connected");
                let raced = {
                    let mut slot = self.slot();
                    slot.state = ConnectionState::Connected;
                    slot.active.replace(session)
                };
                if let Some(raced) = raced {
                    warn!(endpoint = %raced.endpoint, "superseding concurrently opened connection");
                    close_session(raced, "superseded").await;
                }
                Ok(connection)
            }
            Err(e) => {
                error!(identifier, "connect failed: {e}");
                let mut slot = self.slot();
                if slot.active.is_none() && slot.generation == generation {
                    slot.state = ConnectionState::Disconnected;
                }
                Err(e)
            }
        }
    }

    async fn open_session(
        &self,
        request: &ConnectRequest,
        identifier: &str,
    ) -> Result<ActiveSession, ConnectError> {
        let endpoint = self.resolve(request, identifier).await?;
        let options = OpenOptions {
            timeout: request.timeout.unwrap_or(self.settings.open_timeout),
        };
        debug!(%endpoint, timeout = ?options.timeout, "opening connection");

        let stream = self.provider.open(&endpoint, options).await.map_err(|e| {
            if request.interface == InterfaceType::Usb {
                ConnectError::ConnectionError(e.to_string())
            } else {
                ConnectError::ConnectionFailed(e.to_string())
            }
        })?;

        Ok(ActiveSession {
            interface: request.interface,
            endpoint,
            stream: Arc::new(tokio::sync::Mutex::new(stream)),
        })
    }

    async fn resolve(
        &self,
        request: &ConnectRequest,
        identifier: &str,
    ) -> Result<Endpoint, ConnectError> {
        match request.interface {
            InterfaceType::Tcp => {
                let addr = NetworkAddress::parse_with_default(identifier, self.settings.default_port)?;
                Ok(addr.into())
            }
            InterfaceType::Bluetooth => {
                if self.is_paired(identifier).await {
                    Ok(Endpoint::BluetoothClassic {
                        mac: identifier.to_string(),
                        security: request.security,
                    })
                } else {
                    Ok(Endpoint::BluetoothLe {
                        mac: identifier.to_string(),
                    })
                }
            }
            InterfaceType::Usb => self.resolve_usb(identifier).await,
        }
    }

    /// Paired-set membership decides Classic vs LE.  An unreadable paired
    /// list counts as "not paired".
    async fn is_paired(&self, mac: &str) -> bool {
        if !self.gate.can_read_paired_devices() {
            debug!(mac, "cannot read paired devices; treating as unpaired");
            return false;
        }
        match self.provider.paired_devices().await {
            Ok(paired) => paired
                .iter()
                .any(|d| AddressMatch::CaseInsensitive.same(&d.address, mac)),
            Err(e) => {
                warn!(mac, "error reading paired devices: {e}");
                false
            }
        }
    }

    async fn resolve_usb(&self, identifier: &str) -> Result<Endpoint, ConnectError> {
        let device = self
            .coordinator
            .find_usb_device(identifier, self.settings.usb_resolve_timeout)
            .await
            .map_err(|e| ConnectError::ConnectionFailed(e.to_string()))?
            .ok_or_else(|| {
                ConnectError::ConnectionFailed(format!("USB device not found: {identifier}"))
            })?;
        let name = device.device_name;

        if !self.gate.usb_device_permitted(&name) {
            info!(device = %name, "requesting usb permission before connect");
            let answer = self.broker.request(&name);
            self.provider
                .request_usb_permission(&name)
                .await
                .map_err(|e| ConnectError::UsbPermissionError(e.to_string()))?;

            match tokio::time::timeout(self.settings.usb_permission_timeout, answer).await {
                Ok(Ok(true)) => debug!(device = %name, "usb permission granted"),
                Ok(Ok(false)) => return Err(ConnectError::UsbPermissionDenied(name)),
                Ok(Err(_)) => {
                    return Err(ConnectError::UsbPermissionError(
                        "permission request abandoned".into(),
                    ))
                }
                Err(_) => {
                    return Err(ConnectError::UsbPermissionError(format!(
                        "no answer within {:?}",
                        self.settings.usb_permission_timeout
                    )))
                }
            }
        }

        Ok(Endpoint::Usb { device_name: name })
    }

    /// Closes the active session.  A no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        let session = {
            let mut slot = self.slot();
            slot.state = ConnectionState::Disconnected;
            slot.active.take()
        };
        let Some(session) = session else {
            debug!("disconnect with no active connection");
            return Ok(());
        };
        info!(endpoint = %session.endpoint, "disconnecting");
        let closed = session.stream.lock().await.close().await;
        closed.map_err(|e| ConnectError::DisconnectFailed(e.to_string()))
    }

    /// Writes `bytes` verbatim to the active session.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), ConnectError> {
        let (endpoint, stream) = {
            let slot = self.slot();
            let session = slot.active.as_ref().ok_or(ConnectError::NotConnected)?;
            (session.endpoint.clone(), Arc::clone(&session.stream))
        };
        let written = stream.lock().await.write_all(bytes).await;
        written.map_err(|e| {
            error!(%endpoint, "send failed: {e}");
            ConnectError::SendFailed(e.to_string())
        })?;
        debug!(%endpoint, len = bytes.len(), "sent");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.slot().active.as_ref().is_some_and(ActiveSession::is_open)
    }

    pub fn active_connection(&self) -> Option<ActiveConnection> {
        self.slot()
            .active
            .as_ref()
            .filter(|s| s.is_open())
            .map(ActiveSession::describe)
    }

    /// Opens a throwaway LE stream to `mac`, asks for status, and closes it.
    /// The active session is never touched.
    pub async fn test_direct_ble(&self, mac: &str) -> Result<BleProbe, ConnectError> {
        self.gate.require_bluetooth()?;
        let mac = mac.trim();
        if mac.is_empty() {
            return Err(ConnectError::MissingMacAddress);
        }

        let endpoint = Endpoint::BluetoothLe { mac: mac.to_string() };
        let options = OpenOptions {
            timeout: self.settings.open_timeout,
        };
        debug!(mac, "testing direct BLE connection");
        let mut stream = self
            .provider
            .open(&endpoint, options)
            .await
            .map_err(|e: ProviderError| ConnectError::BleConnectionError(e.to_string()))?;

        let outcome = if !stream.is_open() {
            Err(ConnectError::ConnectionFailed(format!(
                "failed to establish BLE connection to {mac}"
            )))
        } else {
            match stream.query_status().await {
                Ok(status) => Ok(BleProbe {
                    address: mac.to_string(),
                    status,
                    status_available: true,
                }),
                Err(StatusError::NoPrinter) => Err(ConnectError::PrinterCreationFailed),
                Err(StatusError::Query(e)) => {
                    warn!(mac, "could not get printer status via BLE: {e}");
                    Ok(BleProbe {
                        address: mac.to_string(),
                        status: STATUS_UNAVAILABLE.to_string(),
                        status_available: false,
                    })
                }
            }
        };

        if let Err(e) = stream.close().await {
            warn!(mac, "error closing BLE test connection: {e}");
        }
        outcome
    }

    /// Closes the active session on host teardown.
    pub async fn shutdown(&self) {
        let session = {
            let mut slot = self.slot();
            slot.state = ConnectionState::Disconnected;
            slot.active.take()
        };
        if let Some(session) = session {
            close_session(session, "active").await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
