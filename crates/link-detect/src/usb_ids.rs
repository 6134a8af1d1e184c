//! USB Vendor/Product ID database for known serial devices
//!
//! This module contains VID/PID pairs for common USB-to-serial bridges and
//! development boards with native USB, and renders the PnP-style identity
//! strings that discovery filters are matched against.

/// Display name used when a device is not in the known-device table
pub const UNKNOWN_DEVICE: &str = "Unknown device";

/// Identity reported for ports without USB information
pub const UNKNOWN_IDENTITY: &str = "UNKNOWN";

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    /// Render the Windows PnP hardware id prefix, e.g. `USB\VID_1A86&PID_7523`
    pub fn pnp_identity(&self) -> String {
        format!("USB\\VID_{:04X}&PID_{:04X}", self.vid, self.pid)
    }
}

/// WCH CH340/CH341
pub mod ch340 {
    use super::UsbId;

    pub const VID: u16 = 0x1A86;

    pub const CH340: UsbId = UsbId::new(VID, 0x7523);
    pub const CH341: UsbId = UsbId::new(VID, 0x5523);
}

/// Silicon Labs CP210x
pub mod cp210x {
    use super::UsbId;

    pub const VID: u16 = 0x10C4;

    pub const CP2102: UsbId = UsbId::new(VID, 0xEA60);
    pub const CP2105: UsbId = UsbId::new(VID, 0xEA70);
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    use super::UsbId;

    pub const VID: u16 = 0x0403;

    pub const FT232R: UsbId = UsbId::new(VID, 0x6001);
    pub const FT231X: UsbId = UsbId::new(VID, 0x6015);
}

/// Prolific PL2303
pub mod prolific {
    use super::UsbId;

    pub const VID: u16 = 0x067B;

    pub const PL2303: UsbId = UsbId::new(VID, 0x2303);
}

/// Arduino boards with native USB or a 16U2 bridge
pub mod arduino {
    use super::UsbId;

    pub const VID: u16 = 0x2341;

    pub const UNO: UsbId = UsbId::new(VID, 0x0043);
    pub const MEGA_2560: UsbId = UsbId::new(VID, 0x0042);
    pub const LEONARDO: UsbId = UsbId::new(VID, 0x8036);
    pub const NANO_EVERY: UsbId = UsbId::new(VID, 0x0058);
}

/// Espressif USB-Serial-JTAG
pub mod espressif {
    use super::UsbId;

    pub const VID: u16 = 0x303A;

    pub const ESP32_S3_JTAG: UsbId = UsbId::new(VID, 0x1001);
}

/// Known devices and their display names
const KNOWN_DEVICES: &[(UsbId, &str)] = &[
    (ch340::CH340, "USB-SERIAL CH340"),
    (ch340::CH341, "USB-SERIAL CH341"),
    (cp210x::CP2102, "CP210x UART Bridge"),
    (cp210x::CP2105, "CP2105 Dual UART Bridge"),
    (ftdi::FT232R, "FT232R USB UART"),
    (ftdi::FT231X, "FT231X USB UART"),
    (prolific::PL2303, "Prolific PL2303"),
    (arduino::UNO, "Arduino Uno"),
    (arduino::MEGA_2560, "Arduino Mega 2560"),
    (arduino::LEONARDO, "Arduino Leonardo"),
    (arduino::NANO_EVERY, "Arduino Nano Every"),
    (espressif::ESP32_S3_JTAG, "ESP32-S3 USB-Serial-JTAG"),
];

/// Look up the display name of a known device
pub fn identify(id: UsbId) -> Option<&'static str> {
    KNOWN_DEVICES
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| *name)
}

/// Look up a known device by its PnP identity string
///
/// Only the `USB\VID_xxxx&PID_xxxx` prefix is considered, so instance
/// suffixes reported by some platforms are ignored.
pub fn identify_pnp(identity: &str) -> Option<&'static str> {
    let prefix = identity.get(..21)?;
    KNOWN_DEVICES
        .iter()
        .map(|(known, _)| *known)
        .find(|known| known.pnp_identity().eq_ignore_ascii_case(prefix))
        .and_then(identify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnp_identity_format() {
        assert_eq!(ch340::CH340.pnp_identity(), "USB\\VID_1A86&PID_7523");
        assert_eq!(ch340::CH340.pnp_identity().len(), 21);
        assert_eq!(ftdi::FT232R.pnp_identity(), "USB\\VID_0403&PID_6001");
    }

    #[test]
    fn test_identify_known_and_unknown() {
        assert_eq!(identify(ch340::CH340), Some("USB-SERIAL CH340"));
        assert_eq!(identify(arduino::UNO), Some("Arduino Uno"));
        assert_eq!(identify(UsbId::new(0xDEAD, 0xBEEF)), None);
    }

    #[test]
    fn test_identify_pnp_ignores_instance_suffix() {
        assert_eq!(
            identify_pnp("USB\\VID_1A86&PID_7523\\5&2F3A1B&0&2"),
            Some("USB-SERIAL CH340")
        );
        assert_eq!(identify_pnp("usb\\vid_2341&pid_0043"), Some("Arduino Uno"));
        assert_eq!(identify_pnp(UNKNOWN_IDENTITY), None);
    }
}
