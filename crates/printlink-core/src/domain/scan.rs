//! Discovery scan kinds and their per-kind policy.
//!
//! Each facade discovery operation maps to one [`ScanKind`].  The kind knows
//! which transport it scans and whether it is single-flight (a second call
//! while one is running fails with `DISCOVERY_IN_PROGRESS`).  Default time
//! limits are per-kind constants; the host's configuration may override them.

use std::fmt;
use std::time::Duration;

use crate::domain::device::Transport;

/// Default multicast hop count.
pub const DEFAULT_MULTICAST_HOPS: u32 = 3;

// Default time limits per scan kind.
pub const LOCAL_BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);
pub const NETWORK_AUTO_TIMEOUT: Duration = Duration::from_secs(15);
pub const MULTICAST_TIMEOUT: Duration = Duration::from_secs(10);
pub const SUBNET_TIMEOUT: Duration = Duration::from_secs(20);
pub const BLUETOOTH_TIMEOUT: Duration = Duration::from_secs(30);
pub const BLE_RADIO_TIMEOUT: Duration = Duration::from_secs(15);
pub const USB_TIMEOUT: Duration = Duration::from_secs(10);

/// One kind of discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    /// Local network broadcast.
    LocalBroadcast,
    /// Combined broadcast + multicast network auto-discovery.
    NetworkAuto,
    /// Multicast with a hop limit.
    Multicast { hops: u32 },
    /// TCP sweep over a subnet range such as `192.168.1.*`.
    Subnet { range: String },
    /// Printer discovery over classic Bluetooth.
    Bluetooth,
    /// Unfiltered Bluetooth LE radio scan.
    BleRadio,
    /// Attached USB printers.
    Usb,
}

impl ScanKind {
    pub fn transport(&self) -> Transport {
        match self {
            ScanKind::LocalBroadcast
            | ScanKind::NetworkAuto
            | ScanKind::Multicast { .. }
            | ScanKind::Subnet { .. } => Transport::Network,
            ScanKind::Bluetooth => Transport::BluetoothClassic,
            ScanKind::BleRadio => Transport::BluetoothLe,
            ScanKind::Usb => Transport::Usb,
        }
    }

    /// Only these kinds report `DISCOVERY_IN_PROGRESS`; the others may overlap.
    pub fn is_single_flight(&self) -> bool {
        matches!(self, ScanKind::NetworkAuto | ScanKind::Bluetooth | ScanKind::Usb)
    }

    /// Stable short name used in logs and config keys.
    pub fn name(&self) -> &'static str {
        match self {
            ScanKind::LocalBroadcast => "local_broadcast",
            ScanKind::NetworkAuto => "network_auto",
            ScanKind::Multicast { .. } => "multicast",
            ScanKind::Subnet { .. } => "subnet",
            ScanKind::Bluetooth => "bluetooth",
            ScanKind::BleRadio => "ble_radio",
            ScanKind::Usb => "usb",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::Multicast { hops } => write!(f, "multicast(hops={hops})"),
            ScanKind::Subnet { range } => write!(f, "subnet({range})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_kinds() {
        assert!(ScanKind::NetworkAuto.is_single_flight());
        assert!(ScanKind::Bluetooth.is_single_flight());
        assert!(ScanKind::Usb.is_single_flight());
        assert!(!ScanKind::LocalBroadcast.is_single_flight());
        assert!(!ScanKind::Multicast { hops: 3 }.is_single_flight());
        assert!(!ScanKind::BleRadio.is_single_flight());
    }

    #[test]
    fn test_network_kinds_share_transport() {
        for kind in [
            ScanKind::LocalBroadcast,
            ScanKind::NetworkAuto,
            ScanKind::Multicast { hops: DEFAULT_MULTICAST_HOPS },
            ScanKind::Subnet { range: "10.0.0.*".into() },
        ] {
            assert_eq!(kind.transport(), Transport::Network, "{kind}");
        }
    }

    #[test]
    fn test_display_includes_parameters() {
        assert_eq!(ScanKind::Multicast { hops: 5 }.to_string(), "multicast(hops=5)");
        assert_eq!(ScanKind::Usb.to_string(), "usb");
    }
}
