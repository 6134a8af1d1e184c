//! Firmware toolchain boundary
//!
//! Building and flashing are delegated to an external toolchain. Both steps
//! stream their output one line at a time through an `OutputSink`, which the
//! session turns into `uploadStdout` notifications.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ToolchainError;
use crate::upload::UploadConfig;

/// Build status that lets the pipeline continue to flashing
pub const BUILD_SUCCESS: &str = "Success";

/// Line-oriented output callback shared by build and flash
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<dyn Fn(String) + Send + Sync>,
}

impl OutputSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Forward one line of tool output
    pub fn line(&self, line: impl Into<String>) {
        (self.inner)(line.into())
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}

/// Status reported by a finished build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Exactly `Success`
    Success,
    /// Anything else the build tool reported
    Other(String),
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }
}

impl From<&str> for BuildStatus {
    fn from(status: &str) -> Self {
        if status == BUILD_SUCCESS {
            BuildStatus::Success
        } else {
            BuildStatus::Other(status.to_string())
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => f.write_str(BUILD_SUCCESS),
            BuildStatus::Other(status) => f.write_str(status),
        }
    }
}

/// Parameters handed to the flash step
#[derive(Debug, Clone, PartialEq)]
pub struct FlashParams {
    /// Board identifier used for the build
    pub board: String,
    /// Target part number (avrdude `-p`)
    pub partno: Option<String>,
    /// Free-form flashing parameters from the upload config
    pub extra: Map<String, Value>,
}

impl FlashParams {
    /// String-valued extra parameter
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Integer-valued extra parameter, accepting numeric strings
    pub fn extra_u32(&self, key: &str) -> Option<u32> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<&UploadConfig> for FlashParams {
    fn from(config: &UploadConfig) -> Self {
        Self {
            board: config.board.clone(),
            partno: config.partno.clone(),
            extra: config.extra.clone(),
        }
    }
}

/// External build and flash tools
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Compile `source` for `board`
    ///
    /// Only `BuildStatus::Success` lets the upload continue. Errors mean the
    /// build could not run at all.
    async fn build(
        &self,
        source: &str,
        board: &str,
        output: OutputSink,
    ) -> Result<BuildStatus, ToolchainError>;

    /// Write the last build artifact to the device at `port`
    ///
    /// Called only while the session has released the port.
    async fn flash(
        &self,
        port: &str,
        params: &FlashParams,
        output: OutputSink,
    ) -> Result<(), ToolchainError>;

    /// Reject flashing parameters `flash` could never accept
    ///
    /// Checked when an upload is requested, before the link is touched.
    fn check_flash_params(&self, _params: &FlashParams) -> Result<(), ToolchainError> {
        Ok(())
    }
}
