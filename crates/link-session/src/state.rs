//! Observable session state

use serde::Serialize;

/// Coarse state of a session, derived from the resources it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Nothing running, nothing open
    Idle,
    /// Enumeration task running
    Discovering,
    /// Device open, incoming data not delivered
    Connected,
    /// Device open and incoming data delivered to the peer
    Reading,
    /// Upload pipeline in flight
    Uploading,
    /// A connection existed and has been closed
    Disconnected,
    /// Session torn down; every call fails
    Disposed,
}

/// Stage of an in-flight upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStage {
    /// Compiling; the data link stays open
    Building,
    /// The flasher owns the physical link
    Flashing,
    /// Reopening the link on the saved peripheral
    Reconnecting,
}

/// Snapshot of a session for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Derived state
    pub state: SessionState,
    /// Path of the open peripheral
    pub peripheral: Option<String>,
    /// Whether incoming data is delivered
    pub subscribed: bool,
    /// Current upload stage
    pub upload: Option<UploadStage>,
    /// Current discovery cycle number
    pub discovery_cycle: u64,
}
