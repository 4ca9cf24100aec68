//! Permission source for desktop hosts.
//!
//! Desktop operating systems have no runtime permission prompts for sockets,
//! so every permission reports as granted.  The platform level is fixed at
//! the modern Bluetooth level so the gate applies the current rule set.

use crate::application::permissions::{Permission, PermissionSource, MODERN_BLUETOOTH_LEVEL};

#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopPermissions;

impl PermissionSource for DesktopPermissions {
    fn is_granted(&self, _permission: Permission) -> bool {
        true
    }

    fn platform_level(&self) -> u32 {
        MODERN_BLUETOOTH_LEVEL
    }

    fn usb_permission_granted(&self, _device_name: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::permissions::PermissionGate;

    #[test]
    fn test_desktop_host_satisfies_every_gate() {
        let gate = PermissionGate::new(Arc::new(DesktopPermissions));

        assert!(gate.bluetooth_permitted());
        assert!(gate.can_read_paired_devices());
        assert!(gate.usb_device_permitted("/dev/bus/usb/001/004"));
    }
}
