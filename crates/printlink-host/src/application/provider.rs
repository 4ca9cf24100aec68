//! Capability-provider seam: everything the host needs from a printer SDK.
//!
//! The vendor SDK (or a plain TCP stack, or a test double) is a black box
//! that can
//!
//! - enumerate printers for a [`ScanKind`], pushing results into a sink,
//! - open a raw byte stream to a resolved [`Endpoint`],
//! - list OS-paired Bluetooth devices and attached USB devices,
//! - report radio availability, and
//! - trigger the OS USB permission dialog.
//!
//! # Scan protocol
//!
//! ```text
//! coordinator                         provider
//! ───────────                         ────────
//! start_scan(kind, sink) ───────────► returns ScanHandle immediately
//!                        ◄─────────── ScanEvent::Found(raw)   (0..n times)
//!                        ◄─────────── ScanEvent::Finished | Failed(msg)
//! handle.cancel()        ───────────► best effort, on timeout only
//! ```
//!
//! The sink is an unbounded channel sender.  Once the coordinator has
//! finalised a result it drops the receiver, so later sends fail and are
//! silently ignored by the provider.

use std::time::Duration;

use async_trait::async_trait;
use printlink_core::{Endpoint, PairedDevice, RawDevice, ScanKind, UsbDeviceInfo};
use thiserror::Error;
use tokio::sync::mpsc;

/// One event pushed by a provider during a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Found(RawDevice),
    Finished,
    Failed(String),
}

/// Where a provider pushes [`ScanEvent`]s.
pub type ScanSink = mpsc::UnboundedSender<ScanEvent>;

/// Cancellation handle for a running scan.
pub trait ScanHandle: Send {
    /// Asks the provider to stop.  Callbacks may still arrive afterwards.
    fn cancel(&mut self);
}

/// Errors reported by a capability provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider does not implement this scan kind or endpoint.
    #[error("unsupported by this provider: {0}")]
    Unsupported(String),

    /// A required OS service (USB manager, Bluetooth stack) is missing.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The OS refused the operation for lack of permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operation did not complete within its time limit.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other provider-reported failure.
    #[error("{0}")]
    Failed(String),
}

/// Why a live status query on an open stream did not produce a status line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// The stream is open but no printer object could be created on it.
    #[error("could not create printer instance on connection")]
    NoPrinter,

    /// The printer exists but did not answer the status query.
    #[error("status query failed: {0}")]
    Query(String),
}

/// Options for opening a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub timeout: Duration,
}

/// Radio availability as seen by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    NoAdapter,
    Disabled,
    /// Adapter enabled but it exposes no LE scanner.
    NoLeScanner,
    Ready,
}

/// An open, exclusively-owned byte stream to one printer.
#[async_trait]
pub trait ByteStream: Send {
    /// Writes `bytes` verbatim: no framing, no acknowledgement wait.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProviderError>;

    async fn close(&mut self) -> Result<(), ProviderError>;

    fn is_open(&self) -> bool;

    /// Asks the printer for a one-line status summary.
    async fn query_status(&mut self) -> Result<String, StatusError>;
}

/// The printer SDK, as seen by the coordinator and session manager.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Starts a scan; results arrive on `sink`.
    async fn start_scan(
        &self,
        kind: &ScanKind,
        sink: ScanSink,
    ) -> Result<Box<dyn ScanHandle>, ProviderError>;

    async fn open(
        &self,
        endpoint: &Endpoint,
        options: OpenOptions,
    ) -> Result<Box<dyn ByteStream>, ProviderError>;

    /// Devices the OS already holds a Bluetooth bond for.
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, ProviderError>;

    fn radio_status(&self) -> RadioStatus;

    /// Attached USB devices.  [`ProviderError::Unavailable`] when the host has
    /// no USB service.
    async fn usb_devices(&self) -> Result<Vec<UsbDeviceInfo>, ProviderError>;

    /// Shows the OS permission dialog for one USB device.  The answer arrives
    /// later through the USB permission broker.
    async fn request_usb_permission(&self, device_name: &str) -> Result<(), ProviderError>;
}
