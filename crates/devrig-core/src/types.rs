//! Core domain types shared across devrig crates

/// Which transport currently reaches a device
///
/// A device is enumerated either by the normal connection daemon
/// ([`ConnectivityMode::Normal`]) or by the bootloader discovery binary
/// ([`ConnectivityMode::Fastboot`] / [`ConnectivityMode::Fastbootd`]).
/// A device that dropped off every transport is [`ConnectivityMode::NotAvailable`]
/// until the registry reclaims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// Reachable through the normal connection daemon
    Normal,
    /// Enumerated in plain bootloader mode
    Fastboot,
    /// Enumerated in fastbootd (userspace bootloader) mode
    Fastbootd,
    /// Not currently reachable on any transport
    NotAvailable,
}

impl ConnectivityMode {
    /// Whether this mode is one of the bootloader transports
    pub fn is_bootloader(&self) -> bool {
        matches!(self, ConnectivityMode::Fastboot | ConnectivityMode::Fastbootd)
    }
}

impl std::fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityMode::Normal => write!(f, "normal"),
            ConnectivityMode::Fastboot => write!(f, "fastboot"),
            ConnectivityMode::Fastbootd => write!(f, "fastbootd"),
            ConnectivityMode::NotAvailable => write!(f, "not-available"),
        }
    }
}

/// Placeholder character the discovery tools print when no serial could be read
const PLACEHOLDER_CHAR: char = '?';

/// Check whether a serial identifies a real device.
///
/// Discovery tools print a run of `?` characters when a device is present on
/// the bus but its serial could not be read. Such a string denotes "no device
/// enumerated", not a device, and must never be admitted into the registry.
pub fn is_valid_serial(serial: &str) -> bool {
    let trimmed = serial.trim();
    !trimmed.is_empty() && !trimmed.chars().all(|c| c == PLACEHOLDER_CHAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_serial() {
        assert!(is_valid_serial("04035EEB0B01F01C"));
        assert!(is_valid_serial("HT99PP800024"));
        assert!(is_valid_serial("127.0.0.1:5555"));
    }

    #[test]
    fn test_placeholder_serial_rejected() {
        assert!(!is_valid_serial("????????????"));
        assert!(!is_valid_serial("?"));
        assert!(!is_valid_serial("  ???  "));
    }

    #[test]
    fn test_empty_serial_rejected() {
        assert!(!is_valid_serial(""));
        assert!(!is_valid_serial("   "));
    }

    #[test]
    fn test_serial_with_embedded_placeholder_is_valid() {
        // Only serials made up entirely of placeholders are filtered
        assert!(is_valid_serial("AB?CD"));
    }

    #[test]
    fn test_connectivity_mode_is_bootloader() {
        assert!(ConnectivityMode::Fastboot.is_bootloader());
        assert!(ConnectivityMode::Fastbootd.is_bootloader());
        assert!(!ConnectivityMode::Normal.is_bootloader());
        assert!(!ConnectivityMode::NotAvailable.is_bootloader());
    }

    #[test]
    fn test_connectivity_mode_display() {
        assert_eq!(ConnectivityMode::Normal.to_string(), "normal");
        assert_eq!(ConnectivityMode::Fastbootd.to_string(), "fastbootd");
    }
}
