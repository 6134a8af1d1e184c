//! Serial port scanner
//!
//! This module provides serial port enumeration.

use serialport::{available_ports, SerialPortType};
use tracing::trace;

use crate::error::DetectError;
use crate::usb_ids::{self, UsbId, UNKNOWN_DEVICE, UNKNOWN_IDENTITY};

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create info for a USB port
    pub fn usb(port: impl Into<String>, id: UsbId) -> Self {
        Self {
            port: port.into(),
            vid: Some(id.vid),
            pid: Some(id.pid),
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        }
    }

    /// USB id pair, if both halves are known
    pub fn usb_id(&self) -> Option<UsbId> {
        Some(UsbId::new(self.vid?, self.pid?))
    }

    /// PnP-style identity string matched by discovery filters
    pub fn identity(&self) -> String {
        self.usb_id()
            .map(|id| id.pnp_identity())
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
    }

    /// Human-readable name, e.g. `USB-SERIAL CH340 (/dev/ttyUSB0)`
    ///
    /// The device kind is looked up from the identity string.
    pub fn display_name(&self) -> String {
        let kind = usb_ids::identify_pnp(&self.identity()).unwrap_or(UNKNOWN_DEVICE);
        format!("{} ({})", kind, self.port)
    }
}

/// Source of the currently attached serial devices
///
/// Implementations may block; callers on an async runtime should invoke
/// them from a blocking-capable thread.
pub trait PortEnumerator: Send + Sync {
    /// List every serial device currently attached
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError>;
}

/// Ports never reported by the scanner
const SKIP_PATTERNS: &[&str] = &[
    // Bluetooth ports on macOS
    "Bluetooth",
    // Debug/logging ports
    "debug",
];

/// Serial port scanner backed by the OS enumeration facility
#[derive(Debug, Default)]
pub struct PortScanner;

impl PortScanner {
    pub fn new() -> Self {
        Self
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        SKIP_PATTERNS
            .iter()
            .any(|pattern| port.port.contains(pattern))
    }
}

impl PortEnumerator for PortScanner {
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(p))
            .collect();

        trace!("Enumerated {} serial port(s)", result.len());
        Ok(result)
    }
}
