//! Paired device types.

use std::fmt;

/// A device bonded with the local adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// Advertised device name.
    pub name: String,
    /// Platform address (a MAC address, or the bound port path for serial links).
    pub address: String,
}

impl PairedDevice {
    /// Creates a new paired device entry.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Returns true if the advertised name contains `matcher`, ignoring case.
    #[must_use]
    pub fn matches(&self, matcher: &str) -> bool {
        self.name.to_lowercase().contains(&matcher.to_lowercase())
    }
}

impl fmt::Display for PairedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Returns the first device whose name matches `matcher`.
#[must_use]
pub fn find_device<'a>(devices: &'a [PairedDevice], matcher: &str) -> Option<&'a PairedDevice> {
    devices.iter().find(|device| device.matches(matcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_ignores_case() {
        let device = PairedDevice::new("ESP32-Sensor-7", "00:11:22:33:44:55");
        assert!(device.matches("esp32"));
        assert!(device.matches("SENSOR"));
        assert!(!device.matches("pixel"));
    }

    #[test]
    fn test_find_first_match() {
        let devices = vec![
            PairedDevice::new("Pixel Buds", "AA:AA:AA:AA:AA:AA"),
            PairedDevice::new("ESP32-Sensor-7", "BB:BB:BB:BB:BB:BB"),
            PairedDevice::new("esp32-backup", "CC:CC:CC:CC:CC:CC"),
        ];

        let found = find_device(&devices, "esp32").unwrap();
        assert_eq!(found.name, "ESP32-Sensor-7");
        assert!(find_device(&devices, "garmin").is_none());
    }
}
