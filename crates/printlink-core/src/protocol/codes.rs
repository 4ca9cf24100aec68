//! Stable error codes reported to the application.
//!
//! The application matches on these strings, so they are part of the public
//! contract: renaming a variant's wire form is a breaking change.  Every
//! layer-specific error type in the host maps onto one of these through its
//! `code()` method.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every failure code an operation can resolve with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Preconditions
    MissingArgument,
    InvalidArgument,
    MissingMacAddress,
    UnsupportedInterface,
    NoActivity,
    MissingPermissions,
    NotImplemented,

    // Contention
    DiscoveryInProgress,

    // Transport
    DiscoveryFailed,
    NoBluetooth,
    BluetoothDisabled,
    NoLeScanner,
    ScanFailed,
    ScanError,
    NoUsbService,
    DeviceNotFound,
    ConnectionFailed,
    ConnectionError,
    PrinterCreationFailed,
    BleConnectionError,
    DisconnectFailed,
    NotConnected,
    SendFailed,

    // Permission flow
    PermissionDenied,
    PermissionRequestFailed,
    PermissionError,
    UsbPermissionDenied,
    UsbPermissionError,

    /// A worker task panicked.
    InternalError,
}

impl ErrorCode {
    /// The SCREAMING_SNAKE_CASE string sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingArgument => "MISSING_ARGUMENT",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::MissingMacAddress => "MISSING_MAC_ADDRESS",
            ErrorCode::UnsupportedInterface => "UNSUPPORTED_INTERFACE",
            ErrorCode::NoActivity => "NO_ACTIVITY",
            ErrorCode::MissingPermissions => "MISSING_PERMISSIONS",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::DiscoveryInProgress => "DISCOVERY_IN_PROGRESS",
            ErrorCode::DiscoveryFailed => "DISCOVERY_FAILED",
            ErrorCode::NoBluetooth => "NO_BLUETOOTH",
            ErrorCode::BluetoothDisabled => "BLUETOOTH_DISABLED",
            ErrorCode::NoLeScanner => "NO_LE_SCANNER",
            ErrorCode::ScanFailed => "SCAN_FAILED",
            ErrorCode::ScanError => "SCAN_ERROR",
            ErrorCode::NoUsbService => "NO_USB_SERVICE",
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::PrinterCreationFailed => "PRINTER_CREATION_FAILED",
            ErrorCode::BleConnectionError => "BLE_CONNECTION_ERROR",
            ErrorCode::DisconnectFailed => "DISCONNECT_FAILED",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::SendFailed => "SEND_FAILED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::PermissionRequestFailed => "PERMISSION_REQUEST_FAILED",
            ErrorCode::PermissionError => "PERMISSION_ERROR",
            ErrorCode::UsbPermissionDenied => "USB_PERMISSION_DENIED",
            ErrorCode::UsbPermissionError => "USB_PERMISSION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_form_matches_as_str() {
        for code in [
            ErrorCode::DiscoveryInProgress,
            ErrorCode::NoLeScanner,
            ErrorCode::UsbPermissionDenied,
            ErrorCode::BleConnectionError,
            ErrorCode::MissingMacAddress,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::from(code.as_str()));
        }
    }

    #[test]
    fn test_display_uses_wire_form() {
        assert_eq!(ErrorCode::NotConnected.to_string(), "NOT_CONNECTED");
    }
}
