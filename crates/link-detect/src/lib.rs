//! Serial Device Detection Library
//!
//! This crate provides serial port enumeration, identification of common
//! USB-serial bridges and development boards, and the per-cycle directory
//! of peripherals reported during discovery.
//!
//! # Example
//!
//! ```rust,no_run
//! use link_detect::{DiscoveryFilters, PortEnumerator, PortScanner};
//!
//! let scanner = PortScanner::new();
//! let filters = DiscoveryFilters::new(vec!["*".to_string()]);
//!
//! for port in scanner.list_ports().unwrap() {
//!     if filters.matches(&port.identity()) {
//!         println!("Found port: {}", port.port);
//!     }
//! }
//! ```

pub mod directory;
pub mod error;
pub mod filter;
pub mod scanner;
pub mod usb_ids;

pub use directory::{Peripheral, PeripheralDirectory};
pub use error::DetectError;
pub use filter::DiscoveryFilters;
pub use scanner::{PortEnumerator, PortScanner, SerialPortInfo};
pub use usb_ids::{identify, identify_pnp, UsbId, UNKNOWN_DEVICE};
