//! Serial Link Simulation Library
//!
//! This crate provides a simulation layer for exercising serial sessions
//! without physical hardware. It includes:
//!
//! - **VirtualBus**: port enumeration and an exclusive-open serial driver
//!   backed by in-memory devices that can be attached and unplugged at will
//! - **ScriptedToolchain**: a firmware toolchain replaying scripted output
//!   and results
//!
//! # Example
//!
//! ```rust
//! use link_detect::usb_ids::ch340;
//! use link_detect::PortEnumerator;
//! use link_sim::VirtualBus;
//!
//! let bus = VirtualBus::new();
//! bus.attach_loopback("/dev/ttySIM0", ch340::CH340);
//!
//! for port in bus.list_ports().unwrap() {
//!     println!("Virtual port: {}", port.display_name());
//! }
//! ```

pub mod bus;
pub mod device;
pub mod toolchain;

pub use bus::VirtualBus;
pub use device::{HostEnd, VirtualDeviceConfig};
pub use toolchain::{ScriptedToolchain, ToolchainCall};
