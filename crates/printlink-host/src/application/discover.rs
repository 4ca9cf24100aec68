//! Discovery Coordinator: one time-bounded, deduplicated scan per call.
//!
//! # Flow of one `discover` call
//!
//! ```text
//! discover(kind)
//!   ├─ single-flight kinds: claim the transport's in-flight flag
//!   │     (already claimed → DISCOVERY_IN_PROGRESS)
//!   ├─ deadline = now + timeout
//!   ├─ transport preconditions (Bluetooth permissions)
//!   ├─ Bluetooth: radio check → paired-device shortcut (bounded by deadline)
//!   ├─ provider.start_scan(kind, sink)  (bounded by deadline)
//!   ├─ drain the sink until Finished / Failed / deadline
//!   │     deadline → cancel the scan, keep what was found
//!   └─ flag released when the guard drops (every exit path)
//! ```
//!
//! The deadline is fixed before the first provider call, so a provider that
//! never answers `paired_devices` or `start_scan` still cannot hold a call
//! past its time limit.
//!
//! # Timeouts are not errors
//!
//! When the deadline passes the coordinator asks the provider to cancel and
//! returns whatever it already accumulated, possibly nothing.  The result is
//! sealed at that point, and the event receiver is dropped, so callbacks a
//! slow provider delivers afterwards cannot change it.
//!
//! # Provider errors
//!
//! An explicit `Failed` event discards what was found and surfaces
//! `DISCOVERY_FAILED`.  This asymmetry with the timeout path is what deployed
//! clients expect; [`ProviderErrorPolicy::KeepPartial`] switches to returning
//! partial results instead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use printlink_core::domain::scan;
use printlink_core::{
    normalize, AddressMatch, BleScanRecord, BluetoothSecurity, DedupKey, DeviceAccumulator,
    DiscoveredDevice, DiscoverySession, ErrorCode, PrinterIdentity, RawDevice, ScanKind, Transport,
    UsbDeviceInfo,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::application::permissions::{MissingPermissions, PermissionGate};
use crate::application::provider::{DeviceProvider, ProviderError, RadioStatus, ScanEvent};

// ── Settings ──────────────────────────────────────────────────────────────────

/// What to do when a provider reports an explicit scan error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorPolicy {
    /// Discard accumulated devices and fail the call.
    #[default]
    Fail,
    /// Return what was accumulated before the error.
    KeepPartial,
}

/// Per-kind scan time limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTimeouts {
    pub local_broadcast: Duration,
    pub network_auto: Duration,
    pub multicast: Duration,
    pub subnet: Duration,
    pub bluetooth: Duration,
    pub ble_radio: Duration,
    pub usb: Duration,
}

impl Default for ScanTimeouts {
    fn default() -> Self {
        Self {
            local_broadcast: scan::LOCAL_BROADCAST_TIMEOUT,
            network_auto: scan::NETWORK_AUTO_TIMEOUT,
            multicast: scan::MULTICAST_TIMEOUT,
            subnet: scan::SUBNET_TIMEOUT,
            bluetooth: scan::BLUETOOTH_TIMEOUT,
            ble_radio: scan::BLE_RADIO_TIMEOUT,
            usb: scan::USB_TIMEOUT,
        }
    }
}

impl ScanTimeouts {
    pub fn for_kind(&self, kind: &ScanKind) -> Duration {
        match kind {
            ScanKind::LocalBroadcast => self.local_broadcast,
            ScanKind::NetworkAuto => self.network_auto,
            ScanKind::Multicast { .. } => self.multicast,
            ScanKind::Subnet { .. } => self.subnet,
            ScanKind::Bluetooth => self.bluetooth,
            ScanKind::BleRadio => self.ble_radio,
            ScanKind::Usb => self.usb,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverySettings {
    pub timeouts: ScanTimeouts,
    pub on_provider_error: ProviderErrorPolicy,
    /// Address comparison used for result deduplication.
    pub address_match: AddressMatch,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("{0} discovery is already in progress")]
    InProgress(Transport),

    #[error(transparent)]
    MissingPermissions(#[from] MissingPermissions),

    #[error("bluetooth is not available on this device")]
    NoBluetooth,

    #[error("bluetooth is not enabled")]
    BluetoothDisabled,

    #[error("bluetooth LE scanner not available")]
    NoLeScanner,

    #[error("discovery failed: {0}")]
    Failed(String),

    #[error("BLE scan failed: {0}")]
    ScanFailed(String),

    #[error("scan refused: {0}")]
    PermissionDenied(String),

    #[error("scan error: {0}")]
    ScanError(String),
}

impl DiscoveryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DiscoveryError::InProgress(_) => ErrorCode::DiscoveryInProgress,
            DiscoveryError::MissingPermissions(_) => ErrorCode::MissingPermissions,
            DiscoveryError::NoBluetooth => ErrorCode::NoBluetooth,
            DiscoveryError::BluetoothDisabled => ErrorCode::BluetoothDisabled,
            DiscoveryError::NoLeScanner => ErrorCode::NoLeScanner,
            DiscoveryError::Failed(_) => ErrorCode::DiscoveryFailed,
            DiscoveryError::ScanFailed(_) => ErrorCode::ScanFailed,
            DiscoveryError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            DiscoveryError::ScanError(_) => ErrorCode::ScanError,
        }
    }
}

/// Why a scan run ended without a result.
#[derive(Debug)]
enum ScanAbort {
    Start(ProviderError),
    Failed(String),
}

// ── In-flight flags ───────────────────────────────────────────────────────────

type InFlight = Arc<Mutex<HashSet<Transport>>>;

/// Holds a transport's in-flight flag; releases it on drop.
///
/// Dropping covers every exit path, including early `?` returns and a
/// panicking worker task.
#[derive(Debug)]
pub struct InFlightGuard {
    flags: InFlight,
    transport: Transport,
}

impl InFlightGuard {
    fn acquire(flags: &InFlight, transport: Transport) -> Option<Self> {
        let claimed = flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transport);
        claimed.then(|| Self {
            flags: Arc::clone(flags),
            transport,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.transport);
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Result of a completed discovery call.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Terminal session record (`Finished` or `TimedOut`).
    pub session: DiscoverySession,
    pub devices: Vec<DiscoveredDevice>,
}

struct ScanRun<T> {
    session: DiscoverySession,
    items: Vec<T>,
}

// A USB scan result that remembers whether the provider reported a product id.
struct UsbCandidate {
    info: UsbDeviceInfo,
    has_product_id: bool,
}

impl DedupKey for UsbCandidate {
    fn dedup_key(&self) -> (Transport, &str) {
        self.info.dedup_key()
    }
}

impl UsbCandidate {
    fn matches(&self, identifier: &str) -> bool {
        if self.has_product_id {
            self.info.matches_identifier(identifier)
        } else {
            identifier == self.info.device_name
        }
    }
}

pub struct DiscoveryCoordinator {
    provider: Arc<dyn DeviceProvider>,
    gate: PermissionGate,
    identity: PrinterIdentity,
    settings: DiscoverySettings,
    in_flight: InFlight,
}

impl DiscoveryCoordinator {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        gate: PermissionGate,
        identity: PrinterIdentity,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            provider,
            gate,
            identity,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Whether a single-flight scan currently holds `transport`.
    pub fn is_in_progress(&self, transport: Transport) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&transport)
    }

    /// Runs one discovery scan of `kind`.
    pub async fn discover(&self, kind: ScanKind) -> Result<DiscoveryOutcome, DiscoveryError> {
        let transport = kind.transport();
        let _guard = if kind.is_single_flight() {
            let guard = InFlightGuard::acquire(&self.in_flight, transport);
            if guard.is_none() {
                warn!(%kind, "discovery already in progress");
                return Err(DiscoveryError::InProgress(transport));
            }
            guard
        } else {
            None
        };

        let timeout = self.settings.timeouts.for_kind(&kind);
        let deadline = Instant::now() + timeout;
        self.require_transport(transport)?;

        if kind == ScanKind::Bluetooth {
            match self.provider.radio_status() {
                RadioStatus::NoAdapter | RadioStatus::Disabled => {
                    return Err(DiscoveryError::BluetoothDisabled)
                }
                RadioStatus::NoLeScanner | RadioStatus::Ready => {}
            }

            let paired = self.paired_printers(deadline).await;
            if !paired.is_empty() {
                info!(count = paired.len(), "returning paired printers without active scan");
                let mut session = DiscoverySession::start(kind, timeout);
                session.finish();
                return Ok(DiscoveryOutcome {
                    session,
                    devices: paired,
                });
            }
            debug!("no paired printers; starting active bluetooth scan");
        }

        let run = self
            .run_scan(&kind, timeout, deadline, self.settings.address_match, normalize)
            .await
            .map_err(|abort| match abort {
                ScanAbort::Start(e) => DiscoveryError::Failed(e.to_string()),
                ScanAbort::Failed(reason) => DiscoveryError::Failed(reason),
            })?;

        Ok(DiscoveryOutcome {
            session: run.session,
            devices: run.items,
        })
    }

    /// Unfiltered Bluetooth LE radio scan.
    ///
    /// Every advertiser is reported; `is_printer` marks likely printers.
    pub async fn discover_ble_radio(&self) -> Result<Vec<BleScanRecord>, DiscoveryError> {
        let kind = ScanKind::BleRadio;
        let timeout = self.settings.timeouts.for_kind(&kind);
        let deadline = Instant::now() + timeout;
        self.require_transport(kind.transport())?;
        match self.provider.radio_status() {
            RadioStatus::NoAdapter => return Err(DiscoveryError::NoBluetooth),
            RadioStatus::Disabled => return Err(DiscoveryError::BluetoothDisabled),
            RadioStatus::NoLeScanner => return Err(DiscoveryError::NoLeScanner),
            RadioStatus::Ready => {}
        }

        let identity = &self.identity;
        let run = self
            .run_scan(&kind, timeout, deadline, self.settings.address_match, |raw| {
                BleScanRecord::from_raw(&raw, identity)
            })
            .await
            .map_err(|abort| match abort {
                ScanAbort::Start(ProviderError::PermissionDenied(m)) => {
                    DiscoveryError::PermissionDenied(m)
                }
                ScanAbort::Start(e) => DiscoveryError::ScanError(e.to_string()),
                ScanAbort::Failed(reason) => DiscoveryError::ScanFailed(reason),
            })?;
        Ok(run.items)
    }

    /// Runs a fresh USB scan bounded by `timeout` and returns the first device
    /// whose path equals `identifier` or whose product id appears in it.
    ///
    /// Does not take the USB in-flight flag.
    pub async fn find_usb_device(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> Result<Option<UsbDeviceInfo>, DiscoveryError> {
        let deadline = Instant::now() + timeout;
        let run = self
            .run_scan(&ScanKind::Usb, timeout, deadline, AddressMatch::Exact, |raw: RawDevice| {
                UsbCandidate {
                    has_product_id: raw.product_id.is_some(),
                    info: UsbDeviceInfo {
                        vendor_id: raw.vendor_id.unwrap_or_default(),
                        product_id: raw.product_id.unwrap_or_default(),
                        device_name: raw.address,
                    },
                }
            })
            .await
            .map_err(|abort| match abort {
                ScanAbort::Start(e) => DiscoveryError::Failed(e.to_string()),
                ScanAbort::Failed(reason) => DiscoveryError::Failed(reason),
            })?;

        Ok(run
            .items
            .into_iter()
            .find(|c| c.matches(identifier))
            .map(|c| c.info))
    }

    fn require_transport(&self, transport: Transport) -> Result<(), DiscoveryError> {
        if self.gate.check_transport_preconditions(transport) {
            return Ok(());
        }
        let missing = MissingPermissions {
            missing: self.gate.missing_bluetooth_permissions(),
        };
        warn!(%transport, "{missing}");
        Err(missing.into())
    }

    /// Paired devices whose names look like printers.  Failures and a lookup
    /// still running at `deadline` degrade to an empty list.
    async fn paired_printers(&self, deadline: Instant) -> Vec<DiscoveredDevice> {
        if !self.gate.can_read_paired_devices() {
            debug!("cannot read paired devices; skipping shortcut");
            return Vec::new();
        }
        let paired = match timeout_at(deadline, self.provider.paired_devices()).await {
            Ok(Ok(paired)) => paired,
            Ok(Err(e)) => {
                warn!("error checking paired devices: {e}");
                return Vec::new();
            }
            Err(_elapsed) => {
                warn!("paired-device lookup did not answer before the deadline");
                return Vec::new();
            }
        };

        let mut found = DeviceAccumulator::new(AddressMatch::CaseInsensitive);
        for device in &paired {
            let is_printer = device
                .name
                .as_deref()
                .is_some_and(|name| self.identity.looks_like_printer(name));
            if is_printer {
                debug!(address = %device.address, name = ?device.name, "paired printer");
                found.insert(DiscoveredDevice::from_paired(device, BluetoothSecurity::Secure));
            }
        }
        found.into_vec()
    }

    async fn run_scan<T, F>(
        &self,
        kind: &ScanKind,
        timeout: Duration,
        deadline: Instant,
        mode: AddressMatch,
        mut convert: F,
    ) -> Result<ScanRun<T>, ScanAbort>
    where
        T: DedupKey + Send,
        F: FnMut(RawDevice) -> T + Send,
    {
        let mut session = DiscoverySession::start(kind.clone(), timeout);
        info!(session = %session.id, %kind, ?timeout, "discovery started");

        let (sink, mut events) = mpsc::unbounded_channel();
        let mut handle = match timeout_at(deadline, self.provider.start_scan(kind, sink)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!(session = %session.id, "provider refused to start scan: {e}");
                return Err(ScanAbort::Start(e));
            }
            Err(_elapsed) => {
                session.time_out();
                warn!(session = %session.id, "provider did not start the scan before the deadline");
                return Ok(ScanRun {
                    session,
                    items: Vec::new(),
                });
            }
        };

        let mut found = DeviceAccumulator::new(mode);
        loop {
            match timeout_at(deadline, events.recv()).await {
                Ok(Some(ScanEvent::Found(raw))) => {
                    debug!(session = %session.id, address = %raw.address, "device found");
                    found.insert(convert(raw));
                }
                Ok(Some(ScanEvent::Finished)) | Ok(None) => {
                    session.finish();
                    break;
                }
                Ok(Some(ScanEvent::Failed(reason))) => {
                    session.fail(reason.clone());
                    match self.settings.on_provider_error {
                        ProviderErrorPolicy::Fail => {
                            warn!(session = %session.id, %reason, "discovery failed");
                            return Err(ScanAbort::Failed(reason));
                        }
                        ProviderErrorPolicy::KeepPartial => {
                            warn!(
                                session = %session.id,
                                %reason,
                                kept = found.len(),
                                "discovery failed; keeping partial results"
                            );
                            break;
                        }
                    }
                }
                Err(_elapsed) => {
                    session.time_out();
                    handle.cancel();
                    info!(session = %session.id, found = found.len(), "discovery timed out");
                    break;
                }
            }
        }
        found.seal();
        drop(events);

        info!(
            session = %session.id,
            state = %session.state(),
            found = found.len(),
            "discovery complete"
        );
        Ok(ScanRun {
            session,
            items: found.into_vec(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
