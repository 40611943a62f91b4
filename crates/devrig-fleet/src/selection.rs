//! Allocation selection criteria
//!
//! A scheduler describes the device it wants with a [`DeviceSelection`];
//! the registry walks its entries in insertion order and hands out the
//! first match that wins the allocation race (first-fit, not load-based).

use devrig_core::ConnectivityMode;

use crate::device::ManagedDevice;

/// Criteria for picking a device out of the registry
#[derive(Debug, Clone, Default)]
pub struct DeviceSelection {
    /// Acceptable serials; empty means any serial
    serials: Vec<String>,
    /// Serials never handed out for this selection
    exclude_serials: Vec<String>,
    /// Whether devices sitting in bootloader mode are acceptable
    allow_bootloader: bool,
}

impl DeviceSelection {
    /// Match any reachable device
    pub fn any() -> Self {
        Self::default()
    }

    /// Match exactly one serial
    pub fn serial(serial: impl Into<String>) -> Self {
        Self {
            serials: vec![serial.into()],
            ..Self::default()
        }
    }

    pub fn add_serial(mut self, serial: impl Into<String>) -> Self {
        self.serials.push(serial.into());
        self
    }

    pub fn exclude_serial(mut self, serial: impl Into<String>) -> Self {
        self.exclude_serials.push(serial.into());
        self
    }

    pub fn allow_bootloader(mut self, allow: bool) -> Self {
        self.allow_bootloader = allow;
        self
    }

    /// Whether a device satisfies these criteria.
    ///
    /// Connectivity only; allocation-state arbitration happens in the
    /// registry through the device's state machine.
    pub fn matches(&self, device: &ManagedDevice) -> bool {
        if self
            .exclude_serials
            .iter()
            .any(|s| s == device.serial())
        {
            return false;
        }
        if !self.serials.is_empty() && !self.serials.iter().any(|s| s == device.serial()) {
            return false;
        }
        match device.connectivity() {
            ConnectivityMode::Normal => true,
            ConnectivityMode::Fastboot | ConnectivityMode::Fastbootd => self.allow_bootloader,
            ConnectivityMode::NotAvailable => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DeviceConnection;

    fn device(serial: &str, mode: ConnectivityMode) -> ManagedDevice {
        ManagedDevice::new(
            DeviceConnection::Local {
                serial: serial.to_string(),
            },
            mode,
            true,
        )
    }

    #[test]
    fn test_any_matches_normal_device() {
        let d = device("serial1", ConnectivityMode::Normal);
        assert!(DeviceSelection::any().matches(&d));
    }

    #[test]
    fn test_serial_filter() {
        let d = device("serial1", ConnectivityMode::Normal);
        assert!(DeviceSelection::serial("serial1").matches(&d));
        assert!(!DeviceSelection::serial("serial2").matches(&d));
        assert!(DeviceSelection::serial("serial2")
            .add_serial("serial1")
            .matches(&d));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let d = device("serial1", ConnectivityMode::Normal);
        let sel = DeviceSelection::serial("serial1").exclude_serial("serial1");
        assert!(!sel.matches(&d));
    }

    #[test]
    fn test_bootloader_devices_need_opt_in() {
        let d = device("serial1", ConnectivityMode::Fastboot);
        assert!(!DeviceSelection::any().matches(&d));
        assert!(DeviceSelection::any().allow_bootloader(true).matches(&d));
    }

    #[test]
    fn test_unreachable_device_never_matches() {
        let d = device("serial1", ConnectivityMode::NotAvailable);
        assert!(!DeviceSelection::any().allow_bootloader(true).matches(&d));
    }
}
