//! Permission Gate: pure predicates over OS permission state.
//!
//! Every Bluetooth or USB operation asks the gate first.  A missing
//! permission is reported as a precise error *before* any radio or USB work
//! starts, so a denied user never sees a half-started scan.
//!
//! # Bluetooth rules
//!
//! | Platform level | Required                                               |
//! |----------------|--------------------------------------------------------|
//! | ≥ 31           | (coarse **or** fine location) **and** `BluetoothScan`  |
//! | < 31           | (coarse **or** fine location) **and** `Bluetooth` **and** `BluetoothAdmin` |
//!
//! Reading the paired-device list additionally needs `BluetoothConnect` on
//! level ≥ 31 (legacy `Bluetooth` below that).
//!
//! # USB
//!
//! USB permission is per device and granted through an OS dialog.  The gate
//! never requests it; it only answers whether it was already granted.

use std::fmt;
use std::sync::Arc;

use printlink_core::{ErrorCode, Transport};
use thiserror::Error;

/// Platform level from which the runtime Bluetooth permissions apply.
pub const MODERN_BLUETOOTH_LEVEL: u32 = 31;

/// OS permissions the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CoarseLocation,
    FineLocation,
    BluetoothScan,
    BluetoothConnect,
    Bluetooth,
    BluetoothAdmin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::CoarseLocation => "ACCESS_COARSE_LOCATION",
            Permission::FineLocation => "ACCESS_FINE_LOCATION",
            Permission::BluetoothScan => "BLUETOOTH_SCAN",
            Permission::BluetoothConnect => "BLUETOOTH_CONNECT",
            Permission::Bluetooth => "BLUETOOTH",
            Permission::BluetoothAdmin => "BLUETOOTH_ADMIN",
        };
        f.write_str(name)
    }
}

/// Read-only view of the host's permission state.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionSource: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Platform API level used to choose between modern and legacy rules.
    fn platform_level(&self) -> u32;

    fn usb_permission_granted(&self, device_name: &str) -> bool;
}

/// Raised when Bluetooth permissions are incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bluetooth permissions are required; missing: {}", format_missing(.missing))]
pub struct MissingPermissions {
    pub missing: Vec<Permission>,
}

impl MissingPermissions {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MissingPermissions
    }
}

fn format_missing(missing: &[Permission]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Permission checks consulted before radio and USB work.
#[derive(Clone)]
pub struct PermissionGate {
    source: Arc<dyn PermissionSource>,
}

impl PermissionGate {
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self { source }
    }

    fn is_modern(&self) -> bool {
        self.source.platform_level() >= MODERN_BLUETOOTH_LEVEL
    }

    /// Permissions still needed for Bluetooth scanning; empty when satisfied.
    pub fn missing_bluetooth_permissions(&self) -> Vec<Permission> {
        let mut missing = Vec::new();
        if !self.source.is_granted(Permission::CoarseLocation)
            && !self.source.is_granted(Permission::FineLocation)
        {
            missing.push(Permission::FineLocation);
        }
        let radio: &[Permission] = if self.is_modern() {
            &[Permission::BluetoothScan]
        } else {
            &[Permission::Bluetooth, Permission::BluetoothAdmin]
        };
        missing.extend(radio.iter().copied().filter(|p| !self.source.is_granted(*p)));
        missing
    }

    pub fn bluetooth_permitted(&self) -> bool {
        self.missing_bluetooth_permissions().is_empty()
    }

    /// `Ok` when Bluetooth work may start.
    pub fn require_bluetooth(&self) -> Result<(), MissingPermissions> {
        let missing = self.missing_bluetooth_permissions();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingPermissions { missing })
        }
    }

    /// Transport-level precondition.
    ///
    /// USB has no transport-wide permission: device grants are checked with
    /// [`usb_device_permitted`](Self::usb_device_permitted) once a device is
    /// known.
    pub fn check_transport_preconditions(&self, transport: Transport) -> bool {
        match transport {
            Transport::Network | Transport::Usb => true,
            Transport::BluetoothClassic | Transport::BluetoothLe => self.bluetooth_permitted(),
        }
    }

    pub fn can_read_paired_devices(&self) -> bool {
        if self.is_modern() {
            self.source.is_granted(Permission::BluetoothConnect)
        } else {
            self.source.is_granted(Permission::Bluetooth)
        }
    }

    pub fn usb_device_permitted(&self, device_name: &str) -> bool {
        self.source.usb_permission_granted(device_name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
