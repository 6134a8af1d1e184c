//! Session tunables

use std::time::Duration;

/// Default period of the discovery enumeration task
pub const DEFAULT_DISCOVERY_PERIOD: Duration = Duration::from_millis(100);

/// Default period of the liveness watchdog
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_millis(10);

/// Timing and buffering parameters of a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often attached devices are enumerated while discovering
    pub discovery_period: Duration,
    /// How often the open device is checked for removal
    pub watchdog_period: Duration,
    /// How long to wait for the device task to acknowledge a close
    pub close_timeout: Duration,
    /// Read buffer size of the device I/O task
    pub read_buffer_size: usize,
    /// Capacity of the command and outbound channels
    pub channel_capacity: usize,
    /// Writes that may wait for the device before new ones fail as busy
    pub write_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_period: DEFAULT_DISCOVERY_PERIOD,
            watchdog_period: DEFAULT_WATCHDOG_PERIOD,
            close_timeout: Duration::from_secs(2),
            read_buffer_size: 1024,
            channel_capacity: 256,
            write_queue: 256,
        }
    }
}
