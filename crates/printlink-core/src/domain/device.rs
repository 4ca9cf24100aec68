//! Transports, raw provider records, and the normalised [`DiscoveredDevice`].
//!
//! A capability provider reports what it finds as a [`RawDevice`]: a transport,
//! an address, and a loose string map of vendor discovery data.  [`normalize`]
//! folds that into the single record shape returned to callers regardless of
//! which transport produced it.
//!
//! # Record shape on the wire
//!
//! ```json
//! {
//!   "transport": "network",
//!   "address": "10.0.0.5",
//!   "friendlyName": "ZD421-203dpi",
//!   "serialNumber": "D2J123456789",
//!   "port": 9100,
//!   "extra": { "PRODUCT_NAME": "ZD421" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::identity::PrinterIdentity;

/// Raw TCP port used by label printers when the provider does not report one.
pub const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Vendor discovery-data key holding the human-readable printer name.
pub const KEY_FRIENDLY_NAME: &str = "FRIENDLY_NAME";
/// Vendor discovery-data key holding the printer serial number.
pub const KEY_SERIAL_NUMBER: &str = "SERIAL_NUMBER";
/// Vendor discovery-data key holding the raw port number for network printers.
pub const KEY_PORT_NUMBER: &str = "PORT_NUMBER";
/// Radio type reported by a native Bluetooth scan (`classic`, `le`, `dual`).
pub const KEY_DEVICE_TYPE: &str = "DEVICE_TYPE";

/// Name reported for radio-scan advertisers that carry none.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

// ── Transport ─────────────────────────────────────────────────────────────────

/// One of the four communication mediums used to reach a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transport {
    /// TCP/IP over Ethernet or Wi-Fi.
    Network,
    /// Classic (BR/EDR) Bluetooth serial profile.
    BluetoothClassic,
    /// Bluetooth Low Energy.
    BluetoothLe,
    /// Directly attached USB printer.
    Usb,
}

impl Transport {
    /// The camelCase name used in JSON payloads and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Network => "network",
            Transport::BluetoothClassic => "bluetoothClassic",
            Transport::BluetoothLe => "bluetoothLe",
            Transport::Usb => "usb",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Interface type (facade-level selector) ────────────────────────────────────

/// Returned when a `connect` request names an interface we do not support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported interface type: {0}")]
pub struct UnsupportedInterface(pub String);

/// The coarse interface selector callers pass to `connect`.
///
/// Callers do not distinguish classic from LE Bluetooth; the connection
/// manager decides that from the OS paired-device set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Tcp,
    Bluetooth,
    Usb,
}

impl InterfaceType {
    /// Maps a concrete transport onto the selector that reaches it.
    pub fn for_transport(transport: Transport) -> Self {
        match transport {
            Transport::Network => InterfaceType::Tcp,
            Transport::BluetoothClassic | Transport::BluetoothLe => InterfaceType::Bluetooth,
            Transport::Usb => InterfaceType::Usb,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceType::Tcp => "tcp",
            InterfaceType::Bluetooth => "bluetooth",
            InterfaceType::Usb => "usb",
        }
    }
}

impl FromStr for InterfaceType {
    type Err = UnsupportedInterface;

    /// Parses `tcp`, `bluetooth`, or `usb`, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(InterfaceType::Tcp),
            "bluetooth" => Ok(InterfaceType::Bluetooth),
            "usb" => Ok(InterfaceType::Usb),
            _ => Err(UnsupportedInterface(s.to_string())),
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Socket security sub-variant for classic Bluetooth connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BluetoothSecurity {
    Secure,
    Insecure,
}

impl BluetoothSecurity {
    /// Only the exact string `"secure"` selects a secure socket; anything
    /// else, including an absent option, falls back to insecure.
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            Some("secure") => BluetoothSecurity::Secure,
            _ => BluetoothSecurity::Insecure,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BluetoothSecurity::Secure => "secure",
            BluetoothSecurity::Insecure => "insecure",
        }
    }
}

// ── Bluetooth device metadata ─────────────────────────────────────────────────

/// OS bond (pairing) state of a Bluetooth device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BondState {
    None,
    Bonding,
    Bonded,
}

/// Radio type reported by a native Bluetooth scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    Classic,
    Le,
    Dual,
    Unknown,
}

impl DeviceKind {
    /// Parses the radio type string a provider reports; anything unknown
    /// maps to [`DeviceKind::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "classic" => DeviceKind::Classic,
            "le" => DeviceKind::Le,
            "dual" => DeviceKind::Dual,
            _ => DeviceKind::Unknown,
        }
    }
}

/// A device the host OS already holds a pairing record for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    /// Advertised name; the OS may not know one.
    pub name: Option<String>,
    /// MAC address as the OS reports it.
    pub address: String,
}

/// A USB device visible to the host's USB service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceInfo {
    /// OS device path, e.g. `/dev/bus/usb/001/004`.
    pub device_name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceInfo {
    /// A caller identifier refers to this device when it is the exact device
    /// path or contains the decimal product id.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        identifier == self.device_name || identifier.contains(&self.product_id.to_string())
    }
}

// ── Raw provider record ───────────────────────────────────────────────────────

/// One device as reported by a capability provider, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDevice {
    pub transport: Transport,
    /// Transport-specific identifier (IP, MAC, or USB device path).
    pub address: String,
    /// Loose vendor key/value data (`FRIENDLY_NAME`, `SERIAL_NUMBER`, ...).
    pub discovery_data: BTreeMap<String, String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub rssi: Option<i16>,
    pub bond_state: Option<BondState>,
}

impl RawDevice {
    pub fn new(transport: Transport, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            discovery_data: BTreeMap::new(),
            vendor_id: None,
            product_id: None,
            rssi: None,
            bond_state: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.discovery_data.insert(key.into(), value.into());
        self
    }

    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_bond_state(mut self, bond_state: BondState) -> Self {
        self.bond_state = Some(bond_state);
        self
    }

    /// Convenience accessor for the vendor `FRIENDLY_NAME` entry.
    pub fn friendly_name(&self) -> Option<&str> {
        self.discovery_data.get(KEY_FRIENDLY_NAME).map(String::as_str)
    }
}

// ── Normalised record ─────────────────────────────────────────────────────────

/// The single record shape every discovery operation returns.
///
/// Within one result set `(transport, address)` is unique; see
/// [`DeviceAccumulator`](crate::DeviceAccumulator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub transport: Transport,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Meaningful only for [`Transport::Network`]; `0` elsewhere.
    pub port: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl DiscoveredDevice {
    /// Builds a record for a paired Bluetooth device found through the OS
    /// bond list rather than an active scan.
    pub fn from_paired(device: &PairedDevice, security: BluetoothSecurity) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("bondState".to_string(), serde_json::json!(BondState::Bonded));
        extra.insert("connectionType".to_string(), Value::from(security.as_str()));
        Self {
            transport: Transport::BluetoothClassic,
            address: device.address.clone(),
            friendly_name: device.name.clone(),
            // Paired devices expose no serial; the MAC stands in for it.
            serial_number: Some(device.address.clone()),
            port: 0,
            extra,
        }
    }
}

/// Folds a provider record into the common [`DiscoveredDevice`] shape.
///
/// - `friendly_name` comes from `FRIENDLY_NAME`; USB devices without one are
///   labelled `USB Printer (<productId>)`.
/// - `serial_number` comes from `SERIAL_NUMBER`.
/// - Network records take `PORT_NUMBER` when it parses, otherwise 9100.
///   Every other transport reports port 0.
/// - All remaining discovery-data keys, plus USB ids, RSSI, and bond state,
///   land in `extra`.
pub fn normalize(raw: RawDevice) -> DiscoveredDevice {
    let RawDevice {
        transport,
        address,
        mut discovery_data,
        vendor_id,
        product_id,
        rssi,
        bond_state,
    } = raw;

    let mut friendly_name = discovery_data.remove(KEY_FRIENDLY_NAME);
    let serial_number = discovery_data.remove(KEY_SERIAL_NUMBER);
    let port_hint = discovery_data
        .remove(KEY_PORT_NUMBER)
        .and_then(|p| p.trim().parse::<u16>().ok());

    let port = match transport {
        Transport::Network => port_hint.unwrap_or(DEFAULT_NETWORK_PORT),
        _ => 0,
    };

    if transport == Transport::Usb && friendly_name.is_none() {
        if let Some(pid) = product_id {
            friendly_name = Some(format!("USB Printer ({pid})"));
        }
    }

    let mut extra: BTreeMap<String, Value> = discovery_data
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    if let Some(vid) = vendor_id {
        extra.insert("vendorId".to_string(), Value::from(vid));
    }
    if let Some(pid) = product_id {
        extra.insert("productId".to_string(), Value::from(pid));
    }
    if let Some(rssi) = rssi {
        extra.insert("rssi".to_string(), Value::from(rssi));
    }
    if let Some(bond) = bond_state {
        extra.insert("bondState".to_string(), serde_json::json!(bond));
    }

    DiscoveredDevice {
        transport,
        address,
        friendly_name,
        serial_number,
        port,
        extra,
    }
}

// ── Native radio scan record ──────────────────────────────────────────────────

/// One advertisement seen by a raw Bluetooth LE radio scan.
///
/// Unlike [`DiscoveredDevice`] these are not filtered: every advertiser is
/// reported, with `is_printer` flagging the ones whose name looks like a printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BleScanRecord {
    pub address: String,
    pub name: String,
    pub rssi: i16,
    pub is_printer: bool,
    pub device_type: DeviceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond_state: Option<BondState>,
}

impl BleScanRecord {
    /// Builds a radio-scan record from a provider report.
    ///
    /// Missing names become `Unknown Device` and a missing RSSI reads as 0.
    pub fn from_raw(raw: &RawDevice, identity: &PrinterIdentity) -> Self {
        let name = raw
            .friendly_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_DEVICE_NAME)
            .to_string();
        let device_type = raw
            .discovery_data
            .get(KEY_DEVICE_TYPE)
            .map(|t| DeviceKind::parse(t))
            .unwrap_or(DeviceKind::Unknown);
        Self {
            address: raw.address.clone(),
            is_printer: identity.matches_brand(&name),
            name,
            rssi: raw.rssi.unwrap_or(0),
            device_type,
            bond_state: raw.bond_state,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_type_parses_case_insensitively() {
        assert_eq!("TCP".parse::<InterfaceType>(), Ok(InterfaceType::Tcp));
        assert_eq!("Bluetooth".parse::<InterfaceType>(), Ok(InterfaceType::Bluetooth));
        assert_eq!("usb".parse::<InterfaceType>(), Ok(InterfaceType::Usb));
    }

    #[test]
    fn test_interface_type_rejects_unknown_value() {
        let err = "serial".parse::<InterfaceType>().unwrap_err();
        assert_eq!(err, UnsupportedInterface("serial".to_string()));
    }

    #[test]
    fn test_interface_type_for_transport_merges_bluetooth_flavours() {
        assert_eq!(
            InterfaceType::for_transport(Transport::BluetoothClassic),
            InterfaceType::Bluetooth
        );
        assert_eq!(
            InterfaceType::for_transport(Transport::BluetoothLe),
            InterfaceType::Bluetooth
        );
        assert_eq!(InterfaceType::for_transport(Transport::Network), InterfaceType::Tcp);
    }

    #[test]
    fn test_bluetooth_security_defaults_to_insecure() {
        assert_eq!(BluetoothSecurity::from_option(None), BluetoothSecurity::Insecure);
        assert_eq!(
            BluetoothSecurity::from_option(Some("SECURE")),
            BluetoothSecurity::Insecure
        );
        assert_eq!(
            BluetoothSecurity::from_option(Some("secure")),
            BluetoothSecurity::Secure
        );
    }

    #[test]
    fn test_normalize_network_record_defaults_port_to_9100() {
        // Arrange
        let raw = RawDevice::new(Transport::Network, "10.0.0.5")
            .with_data(KEY_FRIENDLY_NAME, "ZD421")
            .with_data(KEY_SERIAL_NUMBER, "D2J000000001");

        // Act
        let dev = normalize(raw);

        // Assert
        assert_eq!(dev.port, DEFAULT_NETWORK_PORT);
        assert_eq!(dev.friendly_name.as_deref(), Some("ZD421"));
        assert_eq!(dev.serial_number.as_deref(), Some("D2J000000001"));
        assert!(dev.extra.is_empty(), "consumed keys must not leak into extra");
    }

    #[test]
    fn test_normalize_network_record_uses_reported_port() {
        let raw = RawDevice::new(Transport::Network, "10.0.0.6").with_data(KEY_PORT_NUMBER, "6101");
        assert_eq!(normalize(raw).port, 6101);
    }

    #[test]
    fn test_normalize_network_record_ignores_garbage_port() {
        let raw = RawDevice::new(Transport::Network, "10.0.0.6").with_data(KEY_PORT_NUMBER, "n/a");
        assert_eq!(normalize(raw).port, DEFAULT_NETWORK_PORT);
    }

    #[test]
    fn test_normalize_usb_record_labels_by_product_id() {
        // Arrange
        let raw = RawDevice::new(Transport::Usb, "/dev/bus/usb/001/004").with_usb_ids(0x0a5f, 0x0166);

        // Act
        let dev = normalize(raw);

        // Assert
        assert_eq!(dev.port, 0);
        assert_eq!(dev.friendly_name.as_deref(), Some("USB Printer (358)"));
        assert_eq!(dev.extra["vendorId"], Value::from(0x0a5f_u16));
        assert_eq!(dev.extra["productId"], Value::from(0x0166_u16));
    }

    #[test]
    fn test_normalize_bluetooth_record_keeps_metadata_in_extra() {
        let raw = RawDevice::new(Transport::BluetoothLe, "AC:3F:A4:00:11:22")
            .with_rssi(-61)
            .with_bond_state(BondState::None)
            .with_data("PRODUCT_NAME", "ZQ320");

        let dev = normalize(raw);

        assert_eq!(dev.port, 0);
        assert_eq!(dev.extra["rssi"], Value::from(-61));
        assert_eq!(dev.extra["bondState"], Value::from("none"));
        assert_eq!(dev.extra["PRODUCT_NAME"], Value::from("ZQ320"));
    }

    #[test]
    fn test_discovered_device_serializes_camel_case() {
        let dev = normalize(
            RawDevice::new(Transport::Network, "10.0.0.5").with_data(KEY_FRIENDLY_NAME, "ZT410"),
        );
        let json = serde_json::to_value(&dev).unwrap();
        assert_eq!(json["friendlyName"], "ZT410");
        assert_eq!(json["transport"], "network");
        assert_eq!(json["port"], 9100);
        assert!(json.get("serialNumber").is_none());
    }

    #[test]
    fn test_from_paired_uses_mac_as_serial() {
        let paired = PairedDevice {
            name: Some("ZQ520".to_string()),
            address: "00:11:22:33:44:55".to_string(),
        };
        let dev = DiscoveredDevice::from_paired(&paired, BluetoothSecurity::Secure);
        assert_eq!(dev.transport, Transport::BluetoothClassic);
        assert_eq!(dev.serial_number.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(dev.extra["connectionType"], Value::from("secure"));
    }

    #[test]
    fn test_ble_scan_record_defaults_name_and_flags_printers() {
        // Arrange
        let identity = PrinterIdentity::default();
        let anonymous = RawDevice::new(Transport::BluetoothLe, "11:22:33:44:55:66").with_rssi(-80);
        let printer = RawDevice::new(Transport::BluetoothLe, "AC:3F:A4:00:11:22")
            .with_data(KEY_FRIENDLY_NAME, "ZQ320 Mobile")
            .with_data(KEY_DEVICE_TYPE, "LE")
            .with_bond_state(BondState::Bonded);

        // Act
        let a = BleScanRecord::from_raw(&anonymous, &identity);
        let b = BleScanRecord::from_raw(&printer, &identity);

        // Assert
        assert_eq!(a.name, UNKNOWN_DEVICE_NAME);
        assert!(!a.is_printer);
        assert_eq!(a.device_type, DeviceKind::Unknown);
        assert!(b.is_printer);
        assert_eq!(b.device_type, DeviceKind::Le);
        assert_eq!(b.bond_state, Some(BondState::Bonded));
    }

    #[test]
    fn test_usb_device_matches_path_or_product_id() {
        let usb = UsbDeviceInfo {
            device_name: "/dev/bus/usb/001/004".to_string(),
            vendor_id: 2655,
            product_id: 358,
        };
        assert!(usb.matches_identifier("/dev/bus/usb/001/004"));
        assert!(usb.matches_identifier("USB Printer (358)"));
        assert!(!usb.matches_identifier("/dev/bus/usb/001/005"));
    }
}
