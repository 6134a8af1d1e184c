//! Peripherals reported during the current discovery cycle

use std::collections::BTreeMap;

use serde::Serialize;

use crate::scanner::SerialPortInfo;

/// A serial device reported to the remote client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peripheral {
    /// Stable identifier, the device path
    pub id: String,
    /// PnP-style vendor/product identity
    pub identity: String,
    /// Display name derived from the known-device table
    pub name: String,
}

impl Peripheral {
    /// Device path used to open the port
    pub fn path(&self) -> &str {
        &self.id
    }
}

impl From<&SerialPortInfo> for Peripheral {
    fn from(info: &SerialPortInfo) -> Self {
        Self {
            id: info.port.clone(),
            identity: info.identity(),
            name: info.display_name(),
        }
    }
}

/// Versioned map of the peripherals reported in one discovery cycle
///
/// Every `reset` starts a new cycle; a path is reported at most once per
/// cycle no matter how many enumeration ticks observe it.
#[derive(Debug, Default)]
pub struct PeripheralDirectory {
    cycle: u64,
    entries: BTreeMap<String, Peripheral>,
}

impl PeripheralDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all entries and start a new cycle, returning its number
    pub fn reset(&mut self) -> u64 {
        self.cycle += 1;
        self.entries.clear();
        self.cycle
    }

    /// Current cycle number (0 before the first discovery)
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Record a peripheral; returns `false` if its path was already reported
    pub fn insert(&mut self, peripheral: Peripheral) -> bool {
        if self.entries.contains_key(&peripheral.id) {
            return false;
        }
        self.entries.insert(peripheral.id.clone(), peripheral);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Peripheral> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peripheral> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_ids::ch340;

    fn ch340(port: &str) -> Peripheral {
        Peripheral::from(&SerialPortInfo::usb(port, ch340::CH340))
    }

    #[test]
    fn test_insert_deduplicates_by_path() {
        let mut dir = PeripheralDirectory::new();
        dir.reset();

        assert!(dir.insert(ch340("/dev/ttyUSB0")));
        assert!(!dir.insert(ch340("/dev/ttyUSB0")));
        assert!(dir.insert(ch340("/dev/ttyUSB1")));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_reset_starts_new_cycle() {
        let mut dir = PeripheralDirectory::new();
        assert_eq!(dir.cycle(), 0);

        assert_eq!(dir.reset(), 1);
        dir.insert(ch340("/dev/ttyUSB0"));

        assert_eq!(dir.reset(), 2);
        assert!(dir.is_empty());
        assert!(dir.get("/dev/ttyUSB0").is_none());
        assert!(dir.insert(ch340("/dev/ttyUSB0")));
    }

    #[test]
    fn test_peripheral_from_port_info() {
        let p = ch340("COM3");
        assert_eq!(p.path(), "COM3");
        assert_eq!(p.identity, "USB\\VID_1A86&PID_7523");
        assert_eq!(p.name, "USB-SERIAL CH340 (COM3)");
    }
}
