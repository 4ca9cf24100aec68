//! Identifier parsing and resolved connection endpoints.
//!
//! Callers connect with a loose string identifier.  For TCP that is
//! `host` or `host:port`; for Bluetooth a MAC address; for USB a device path
//! or anything that contains the product id.  The connection manager turns
//! that into an [`Endpoint`] the capability provider can open.

use std::fmt;

use thiserror::Error;

use crate::domain::device::{BluetoothSecurity, Transport, DEFAULT_NETWORK_PORT};

/// Errors produced while parsing a caller-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The identifier (or its host part) was empty.
    #[error("identifier is empty")]
    Empty,
}

/// A TCP host and port parsed from an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    /// Splits `identifier` on its first `:`.
    ///
    /// A numeric right-hand side overrides the default port; anything else
    /// (including an out-of-range number) keeps 9100.
    pub fn parse(identifier: &str) -> Result<Self, AddressError> {
        Self::parse_with_default(identifier, DEFAULT_NETWORK_PORT)
    }

    /// Same as [`parse`](Self::parse) with a configurable fallback port.
    pub fn parse_with_default(identifier: &str, default_port: u16) -> Result<Self, AddressError> {
        let identifier = identifier.trim();
        let (host, port) = match identifier.split_once(':') {
            Some((host, rest)) => (host, rest.parse::<u16>().unwrap_or(default_port)),
            None => (identifier, default_port),
        };
        if host.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A fully resolved target a provider can open a byte stream to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    BluetoothClassic { mac: String, security: BluetoothSecurity },
    BluetoothLe { mac: String },
    Usb { device_name: String },
}

impl Endpoint {
    pub fn transport(&self) -> Transport {
        match self {
            Endpoint::Tcp { .. } => Transport::Network,
            Endpoint::BluetoothClassic { .. } => Transport::BluetoothClassic,
            Endpoint::BluetoothLe { .. } => Transport::BluetoothLe,
            Endpoint::Usb { .. } => Transport::Usb,
        }
    }

    /// The address string recorded on the active session.
    pub fn address(&self) -> String {
        match self {
            Endpoint::Tcp { host, port } => format!("{host}:{port}"),
            Endpoint::BluetoothClassic { mac, .. } | Endpoint::BluetoothLe { mac } => mac.clone(),
            Endpoint::Usb { device_name } => device_name.clone(),
        }
    }
}

impl From<NetworkAddress> for Endpoint {
    fn from(addr: NetworkAddress) -> Self {
        Endpoint::Tcp {
            host: addr.host,
            port: addr.port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::BluetoothClassic { mac, security } => {
                write!(f, "{}({mac}, {})", self.transport(), security.as_str())
            }
            other => write!(f, "{}({})", other.transport(), other.address()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_defaults_to_9100() {
        let addr = NetworkAddress::parse("10.0.0.5").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, 9100);
    }

    #[test]
    fn test_parse_numeric_port_overrides_default() {
        let addr = NetworkAddress::parse("10.0.0.5:9200").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, 9200);
    }

    #[test]
    fn test_parse_non_numeric_port_keeps_default() {
        let addr = NetworkAddress::parse("printer.local:raw").unwrap();
        assert_eq!(addr.host, "printer.local");
        assert_eq!(addr.port, 9100);
    }

    #[test]
    fn test_parse_out_of_range_port_keeps_default() {
        assert_eq!(NetworkAddress::parse("10.0.0.5:70000").unwrap().port, 9100);
    }

    #[test]
    fn test_parse_empty_host_is_rejected() {
        assert_eq!(NetworkAddress::parse(""), Err(AddressError::Empty));
        assert_eq!(NetworkAddress::parse(":9100"), Err(AddressError::Empty));
    }

    #[test]
    fn test_endpoint_address_and_transport() {
        let tcp: Endpoint = NetworkAddress::parse("10.0.0.5").unwrap().into();
        assert_eq!(tcp.transport(), Transport::Network);
        assert_eq!(tcp.address(), "10.0.0.5:9100");

        let le = Endpoint::BluetoothLe { mac: "AA:BB".to_string() };
        assert_eq!(le.transport(), Transport::BluetoothLe);
        assert_eq!(le.address(), "AA:BB");
    }

    #[test]
    fn test_endpoint_display_includes_security_for_classic() {
        let ep = Endpoint::BluetoothClassic {
            mac: "AA:BB".to_string(),
            security: BluetoothSecurity::Secure,
        };
        assert_eq!(ep.to_string(), "bluetoothClassic(AA:BB, secure)");
    }
}
