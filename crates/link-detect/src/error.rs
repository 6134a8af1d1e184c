//! Error types for serial device detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Discovery filters were missing or empty
    #[error("discovery request must include filters")]
    EmptyFilters,
}
