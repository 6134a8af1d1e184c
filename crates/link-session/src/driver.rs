//! Serial driver boundary
//!
//! The session opens devices through a `SerialDriver` and talks to them as a
//! plain async byte stream. Real hardware goes through tokio-serial; tests and
//! the simulator hand out in-memory streams.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, SerialPortBuilderExt, StopBits};
use tracing::debug;

use crate::error::DriverError;

/// Byte stream of an open device
pub trait DeviceIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> DeviceIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Line settings passed with `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl PeripheralConfig {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
        }
    }

    /// Check that every field maps to a real line setting
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.baud_rate == 0 {
            return Err(DriverError::InvalidConfig("baud rate must be positive".into()));
        }
        self.serial_data_bits()?;
        self.serial_stop_bits()?;
        Ok(())
    }

    fn serial_data_bits(&self) -> Result<DataBits, DriverError> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(DriverError::InvalidConfig(format!(
                "unsupported data bits: {}",
                other
            ))),
        }
    }

    fn serial_stop_bits(&self) -> Result<StopBits, DriverError> {
        match self.stop_bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(DriverError::InvalidConfig(format!(
                "unsupported stop bits: {}",
                other
            ))),
        }
    }
}

/// Opens devices by path
pub trait SerialDriver: Send + Sync {
    /// Open the device at `path` with the given line settings
    ///
    /// A read returning EOF or an error on the returned stream means the
    /// device is gone.
    fn open(&self, path: &str, config: &PeripheralConfig)
        -> Result<Box<dyn DeviceIo>, DriverError>;
}

/// Driver for real serial ports backed by tokio-serial
#[derive(Debug, Clone)]
pub struct TokioSerialDriver {
    timeout: Duration,
}

impl TokioSerialDriver {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(100),
        }
    }
}

impl Default for TokioSerialDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialDriver for TokioSerialDriver {
    fn open(
        &self,
        path: &str,
        config: &PeripheralConfig,
    ) -> Result<Box<dyn DeviceIo>, DriverError> {
        debug!(
            "Opening {} at {} baud ({}N{})",
            path, config.baud_rate, config.data_bits, config.stop_bits
        );

        let stream = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.serial_data_bits()?)
            .stop_bits(config.serial_stop_bits()?)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|e| DriverError::OpenFailed {
                port: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(stream))
    }
}
