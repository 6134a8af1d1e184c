//! Error types for the session

use thiserror::Error;

/// Errors returned through a call's completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Malformed or missing request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A peripheral is already connected
    #[error("already connected to peripheral")]
    AlreadyConnected,

    /// Peripheral id not reported in the current discovery cycle
    #[error("invalid peripheral ID: {0}")]
    UnknownPeripheral(String),

    /// Operation requires an open connection
    #[error("not connected to a peripheral")]
    NotConnected,

    /// The driver failed to open the device
    #[error("failed to open {path}: {reason}")]
    OpenError { path: String, reason: String },

    /// The driver failed to write to the device
    #[error("error while attempting to write: {0}")]
    WriteError(String),

    /// The driver failed to close the device
    #[error("error while closing peripheral: {0}")]
    CloseError(String),

    /// The firmware build did not succeed
    #[error("build failed: {0}")]
    BuildFailure(String),

    /// Writing the firmware to the device failed
    #[error("flash failed: {0}")]
    FlashFailure(String),

    /// Unknown RPC method
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Another upload holds the link
    #[error("an upload is already in progress")]
    UploadInProgress,

    /// The session has been disposed
    #[error("session has been disposed")]
    Disposed,
}

impl SessionError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::AlreadyConnected => "AlreadyConnected",
            Self::UnknownPeripheral(_) => "UnknownPeripheral",
            Self::NotConnected => "NotConnected",
            Self::OpenError { .. } => "OpenError",
            Self::WriteError(_) => "WriteError",
            Self::CloseError(_) => "CloseError",
            Self::BuildFailure(_) => "BuildFailure",
            Self::FlashFailure(_) => "FlashFailure",
            Self::MethodNotFound(_) => "MethodNotFound",
            Self::UploadInProgress => "UploadInProgress",
            Self::Disposed => "Disposed",
        }
    }
}

/// Errors raised by a serial driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// Device could not be opened
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Port parameters the driver cannot apply
    #[error("unsupported port configuration: {0}")]
    InvalidConfig(String),

    /// The device I/O task is gone, or was closed mid-write
    #[error("device is closed")]
    Closed,

    /// The write queue of the device is full
    #[error("device busy")]
    Busy,

    /// The device did not acknowledge a close in time
    #[error("timed out closing device")]
    CloseTimeout,

    /// I/O error on an open device
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the firmware toolchain
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The tool could not be started
    #[error("failed to launch {tool}: {reason}")]
    Launch { tool: String, reason: String },

    /// The tool ran and reported failure
    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: String },

    /// A required flashing parameter is missing
    #[error("missing flashing parameter: {0}")]
    MissingParameter(String),

    /// Flash requested without a build artifact
    #[error("no build artifact available")]
    NoArtifact,

    /// I/O error while preparing or running the tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_wire_wording() {
        assert_eq!(
            SessionError::UnknownPeripheral("COM9".into()).to_string(),
            "invalid peripheral ID: COM9"
        );
        assert_eq!(
            SessionError::AlreadyConnected.to_string(),
            "already connected to peripheral"
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(SessionError::NotConnected.kind(), "NotConnected");
        assert_eq!(
            SessionError::OpenError {
                path: "/dev/ttyUSB0".into(),
                reason: "busy".into()
            }
            .kind(),
            "OpenError"
        );
    }
}
