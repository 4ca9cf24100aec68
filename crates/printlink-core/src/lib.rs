//! # printlink-core
//!
//! Shared library for PrintLink containing the printer-discovery domain model,
//! result deduplication, and the JSON method-channel envelope.
//!
//! This crate is used by both the host library and the bridge binary.
//! It has zero dependencies on OS APIs, vendor SDKs, async runtimes, or sockets.
//!
//! # Architecture overview
//!
//! PrintLink sits between an application and a label-printer capability
//! provider (a vendor SDK or a plain TCP stack).  The application asks for
//! printers on one of four transports (network, classic Bluetooth, Bluetooth
//! LE, USB), picks one, connects, and streams opaque command bytes to it.
//!
//! This crate (`printlink-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure data: transports, raw provider records and their
//!   normalised [`DiscoveredDevice`] shape, the first-seen-wins
//!   [`DeviceAccumulator`], the printer identity heuristic, address parsing,
//!   and the discovery/connection session state machines.
//!
//! - **`protocol`** – The request/response envelope exchanged with the
//!   application over the method channel, plus the stable [`ErrorCode`]
//!   strings every failure is reported with.

pub mod domain;
pub mod protocol;

pub use domain::accumulator::{AddressMatch, DedupKey, DeviceAccumulator, Insert};
pub use domain::address::{AddressError, Endpoint, NetworkAddress};
pub use domain::device::{
    normalize, BleScanRecord, BluetoothSecurity, BondState, DeviceKind, DiscoveredDevice,
    InterfaceType, PairedDevice, RawDevice, Transport, UnsupportedInterface, UsbDeviceInfo,
    DEFAULT_NETWORK_PORT, KEY_DEVICE_TYPE, KEY_FRIENDLY_NAME, KEY_PORT_NUMBER, KEY_SERIAL_NUMBER,
    UNKNOWN_DEVICE_NAME,
};
pub use domain::identity::{PrinterIdentity, DEFAULT_BRAND_TOKENS};
pub use domain::scan::{ScanKind, DEFAULT_MULTICAST_HOPS};
pub use domain::session::{ConnectionState, DiscoverySession, DiscoveryState};
pub use protocol::codes::ErrorCode;
pub use protocol::messages::{MethodCall, MethodResponse, MethodResult};
