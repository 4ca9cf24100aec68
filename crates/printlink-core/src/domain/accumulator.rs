//! First-seen-wins result accumulator for discovery scans.
//!
//! # Why a dedicated type? (for beginners)
//!
//! Providers report devices through callbacks.  The same printer is often
//! reported more than once in a single scan (it answers both a broadcast and a
//! multicast probe, or a BLE advertiser repeats itself every few hundred
//! milliseconds).  Callers want each printer exactly once.
//!
//! The accumulator keeps results in arrival order and silently drops any later
//! record whose `(transport, address)` pair was already seen.
//!
//! # Sealing
//!
//! When a scan times out the coordinator finalises the result it already has.
//! A provider may keep calling back for a short while after it was asked to
//! cancel.  [`DeviceAccumulator::seal`] freezes the set: later inserts are
//! ignored and reported as [`Insert::Sealed`], so a finalised result never
//! changes underneath the caller.

use std::collections::HashSet;

use tracing::trace;

use crate::domain::device::{BleScanRecord, DiscoveredDevice, Transport, UsbDeviceInfo};

/// How two addresses are compared when checking for duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMatch {
    /// Byte-for-byte string equality.
    #[default]
    Exact,
    /// ASCII case-insensitive equality (`aa:bb` equals `AA:BB`).
    CaseInsensitive,
}

impl AddressMatch {
    /// Returns `true` if `a` and `b` name the same device under this mode.
    pub fn same(self, a: &str, b: &str) -> bool {
        match self {
            AddressMatch::Exact => a == b,
            AddressMatch::CaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }

    fn key(self, address: &str) -> String {
        match self {
            AddressMatch::Exact => address.to_string(),
            AddressMatch::CaseInsensitive => address.to_ascii_uppercase(),
        }
    }
}

/// Anything that can be deduplicated by `(transport, address)`.
pub trait DedupKey {
    fn dedup_key(&self) -> (Transport, &str);
}

impl DedupKey for DiscoveredDevice {
    fn dedup_key(&self) -> (Transport, &str) {
        (self.transport, &self.address)
    }
}

impl DedupKey for BleScanRecord {
    fn dedup_key(&self) -> (Transport, &str) {
        (Transport::BluetoothLe, &self.address)
    }
}

impl DedupKey for UsbDeviceInfo {
    fn dedup_key(&self) -> (Transport, &str) {
        (Transport::Usb, &self.device_name)
    }
}

/// Result of offering one item to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// First time this `(transport, address)` was seen; the item was stored.
    Added,
    /// Already present; the item was dropped.
    Duplicate,
    /// The accumulator was sealed; the item was dropped.
    Sealed,
}

/// Ordered, deduplicating collection of discovery results.
#[derive(Debug)]
pub struct DeviceAccumulator<T = DiscoveredDevice> {
    mode: AddressMatch,
    seen: HashSet<(Transport, String)>,
    items: Vec<T>,
    sealed: bool,
}

impl<T: DedupKey> DeviceAccumulator<T> {
    pub fn new(mode: AddressMatch) -> Self {
        Self {
            mode,
            seen: HashSet::new(),
            items: Vec::new(),
            sealed: false,
        }
    }

    /// Offers `item`; stores it only if unsealed and not yet seen.
    pub fn insert(&mut self, item: T) -> Insert {
        let (transport, address) = item.dedup_key();
        if self.sealed {
            trace!(%transport, address, "result already finalised; ignoring late device");
            return Insert::Sealed;
        }
        let key = (transport, self.mode.key(address));
        if !self.seen.insert(key) {
            trace!(%transport, address, "duplicate device dropped");
            return Insert::Duplicate;
        }
        self.items.push(item);
        Insert::Added
    }

    /// Freezes the result set.  Idempotent.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mode(&self) -> AddressMatch {
        self.mode
    }

    /// Consumes the accumulator, returning items in arrival order.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: DedupKey> Default for DeviceAccumulator<T> {
    fn default() -> Self {
        Self::new(AddressMatch::Exact)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::{normalize, RawDevice};

    fn device(transport: Transport, address: &str) -> DiscoveredDevice {
        normalize(RawDevice::new(transport, address))
    }

    #[test]
    fn test_insert_keeps_first_seen_and_drops_later_duplicate() {
        // Arrange
        let mut acc = DeviceAccumulator::new(AddressMatch::Exact);
        let first = normalize(
            RawDevice::new(Transport::Network, "10.0.0.5").with_data("FRIENDLY_NAME", "first"),
        );
        let second = normalize(
            RawDevice::new(Transport::Network, "10.0.0.5").with_data("FRIENDLY_NAME", "second"),
        );

        // Act
        let a = acc.insert(first);
        let b = acc.insert(second);

        // Assert
        assert_eq!(a, Insert::Added);
        assert_eq!(b, Insert::Duplicate);
        let items = acc.into_vec();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].friendly_name.as_deref(), Some("first"));
    }

    #[test]
    fn test_same_address_on_different_transports_is_not_duplicate() {
        let mut acc = DeviceAccumulator::default();
        assert_eq!(acc.insert(device(Transport::BluetoothClassic, "AA:BB")), Insert::Added);
        assert_eq!(acc.insert(device(Transport::BluetoothLe, "AA:BB")), Insert::Added);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_exact_mode_treats_mac_case_as_distinct() {
        let mut acc = DeviceAccumulator::new(AddressMatch::Exact);
        acc.insert(device(Transport::BluetoothLe, "aa:bb:cc:dd:ee:ff"));
        assert_eq!(
            acc.insert(device(Transport::BluetoothLe, "AA:BB:CC:DD:EE:FF")),
            Insert::Added
        );
    }

    #[test]
    fn test_case_insensitive_mode_folds_mac_case() {
        let mut acc = DeviceAccumulator::new(AddressMatch::CaseInsensitive);
        acc.insert(device(Transport::BluetoothLe, "aa:bb:cc:dd:ee:ff"));
        assert_eq!(
            acc.insert(device(Transport::BluetoothLe, "AA:BB:CC:DD:EE:FF")),
            Insert::Duplicate
        );
    }

    #[test]
    fn test_sealed_accumulator_ignores_new_items() {
        // Arrange
        let mut acc = DeviceAccumulator::default();
        acc.insert(device(Transport::Usb, "/dev/bus/usb/001/004"));

        // Act
        acc.seal();
        let late = acc.insert(device(Transport::Usb, "/dev/bus/usb/001/005"));

        // Assert
        assert_eq!(late, Insert::Sealed);
        assert!(acc.is_sealed());
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut acc = DeviceAccumulator::default();
        for addr in ["10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.1"] {
            acc.insert(device(Transport::Network, addr));
        }
        let addrs: Vec<_> = acc.into_vec().into_iter().map(|d| d.address).collect();
        assert_eq!(addrs, vec!["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_address_match_same() {
        assert!(AddressMatch::CaseInsensitive.same("ab:cd", "AB:CD"));
        assert!(!AddressMatch::Exact.same("ab:cd", "AB:CD"));
    }
}
