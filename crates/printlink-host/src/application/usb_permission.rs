//! USB permission broker and the `requestUsbPermissions` use case.
//!
//! USB access is granted per device through an OS dialog.  The answer does
//! not come back as a return value: the OS broadcasts it later with a fixed
//! action string.  The broker turns that broadcast into a one-shot completion
//! the waiting worker can `.await`.
//!
//! ```text
//! worker                          broker                     OS broadcast
//! ──────                          ──────                     ────────────
//! wait = request(dev) ──────────► pending[dev].push((id, tx))
//! provider.request_usb_permission(dev)
//! wait.await  (bounded)                               ◄──── notify(action, dev, granted)
//!           ◄──────────────────── tx.send(granted)
//! ```
//!
//! A [`PermissionWait`] that is dropped before an answer arrives (the request
//! failed, the wait timed out, the caller was cancelled) removes its own
//! entry, so abandoned requests never accumulate.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use printlink_core::ErrorCode;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::application::permissions::PermissionGate;
use crate::application::provider::{DeviceProvider, ProviderError};

/// Broadcast action that carries a USB permission answer.
pub const USB_PERMISSION_ACTION: &str = "com.printlink.USB_PERMISSION";

type Waiters = HashMap<String, Vec<(u64, oneshot::Sender<bool>)>>;

/// Pending USB permission requests keyed by device name.
#[derive(Debug, Default)]
pub struct UsbPermissionBroker {
    pending: Mutex<Waiters>,
    next_id: AtomicU64,
}

/// One registered wait for a USB permission answer.
///
/// Resolves to the broadcast's `granted` flag, or to an error if the broker
/// dropped the request.  Dropping it unregisters the wait.
#[derive(Debug)]
pub struct PermissionWait<'a> {
    broker: &'a UsbPermissionBroker,
    device_name: String,
    id: u64,
    rx: oneshot::Receiver<bool>,
}

impl Future for PermissionWait<'_> {
    type Output = Result<bool, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx)
    }
}

impl Drop for PermissionWait<'_> {
    fn drop(&mut self) {
        self.broker.forget(&self.device_name, self.id);
    }
}

impl UsbPermissionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the answer for `device_name`.
    pub fn request(&self, device_name: &str) -> PermissionWait<'_> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.lock();
            pending.retain(|_, waiters| {
                waiters.retain(|(_, tx)| !tx.is_closed());
                !waiters.is_empty()
            });
            pending
                .entry(device_name.to_string())
                .or_default()
                .push((id, tx));
        }
        debug!(device = device_name, "usb permission wait registered");
        PermissionWait {
            broker: self,
            device_name: device_name.to_string(),
            id,
            rx,
        }
    }

    fn forget(&self, device_name: &str, id: u64) {
        let mut pending = self.lock();
        if let Some(waiters) = pending.get_mut(device_name) {
            waiters.retain(|(waiter, _)| *waiter != id);
            if waiters.is_empty() {
                pending.remove(device_name);
                debug!(device = device_name, "usb permission wait abandoned");
            }
        }
    }

    /// Delivers an OS broadcast.  Returns `true` if at least one waiter was
    /// completed.  Broadcasts with another action are ignored.
    pub fn notify(&self, action: &str, device_name: &str, granted: bool) -> bool {
        if action != USB_PERMISSION_ACTION {
            debug!(action, "ignoring unrelated broadcast");
            return false;
        }
        let waiters = self.lock().remove(device_name).unwrap_or_default();
        if waiters.is_empty() {
            debug!(device = device_name, "usb permission answer with no waiter");
            return false;
        }
        info!(device = device_name, granted, "usb permission answered");
        let mut delivered = false;
        for (_, tx) in waiters {
            delivered |= tx.send(granted).is_ok();
        }
        delivered
    }

    /// Completes every pending request with `false`.  Called when the host
    /// detaches and no answer can arrive any more.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (device, waiters) in drained {
            warn!(device = %device, "cancelling pending usb permission request");
            for (_, tx) in waiters {
                let _ = tx.send(false);
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Waiters> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── requestUsbPermissions ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum UsbAccessError {
    #[error("USB service not available")]
    NoUsbService,

    #[error("USB device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to request USB permission: {0}")]
    RequestFailed(String),

    #[error("error requesting USB permission: {0}")]
    Other(String),
}

impl UsbAccessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            UsbAccessError::NoUsbService => ErrorCode::NoUsbService,
            UsbAccessError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            UsbAccessError::RequestFailed(_) => ErrorCode::PermissionRequestFailed,
            UsbAccessError::Other(_) => ErrorCode::PermissionError,
        }
    }
}

/// Ensures a USB device is accessible or starts the OS permission dialog.
///
/// Returns `true` when permission was already granted and `false` when a
/// request was issued and the answer is still pending.
pub async fn request_usb_access(
    provider: &dyn DeviceProvider,
    gate: &PermissionGate,
    device_name: &str,
) -> Result<bool, UsbAccessError> {
    let devices = provider.usb_devices().await.map_err(|e| match e {
        ProviderError::Unavailable(_) => UsbAccessError::NoUsbService,
        other => UsbAccessError::Other(other.to_string()),
    })?;

    if !devices.iter().any(|d| d.device_name == device_name) {
        return Err(UsbAccessError::DeviceNotFound(device_name.to_string()));
    }

    if gate.usb_device_permitted(device_name) {
        debug!(device = device_name, "usb permission already granted");
        return Ok(true);
    }

    provider
        .request_usb_permission(device_name)
        .await
        .map_err(|e| UsbAccessError::RequestFailed(e.to_string()))?;
    info!(device = device_name, "usb permission requested");
    Ok(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
