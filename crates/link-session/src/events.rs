//! Messages pushed to the remote peer
//!
//! Everything the session reports outside a call's completion leaves through
//! a single outbound channel: notifications (discovery, unplug, incoming
//! data, upload progress and result) and requests that expect a reply.

use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::rpc::RpcError;

/// Asynchronous notification sent to the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A peripheral matching the discovery filters was found
    DidDiscoverPeripheral {
        /// Device path
        peripheral_id: String,
        /// Display name
        name: String,
    },

    /// The connected peripheral went away (or could not be reopened after an upload)
    PeripheralUnplug,

    /// Bytes received from the peripheral, base64-encoded
    OnMessage {
        /// Base64 payload
        message: String,
    },

    /// One line of build or flash output
    UploadStdout {
        /// Output line
        message: String,
    },

    /// The upload pipeline finished and the link is reopened
    UploadSuccess,

    /// The upload pipeline failed
    UploadError {
        /// Human-readable reason
        message: String,
    },
}

impl Notification {
    /// Remote method name
    pub fn method(&self) -> &'static str {
        match self {
            Notification::DidDiscoverPeripheral { .. } => "didDiscoverPeripheral",
            Notification::PeripheralUnplug => "peripheralUnplug",
            Notification::OnMessage { .. } => "onMessage",
            Notification::UploadStdout { .. } => "uploadStdout",
            Notification::UploadSuccess => "uploadSuccess",
            Notification::UploadError { .. } => "uploadError",
        }
    }

    /// Remote params object
    pub fn params(&self) -> Value {
        match self {
            Notification::DidDiscoverPeripheral {
                peripheral_id,
                name,
            } => json!({ "peripheralId": peripheral_id, "name": name }),
            Notification::PeripheralUnplug | Notification::UploadSuccess => json!({}),
            Notification::OnMessage { message } => {
                json!({ "encoding": "base64", "message": message })
            }
            Notification::UploadStdout { message } | Notification::UploadError { message } => {
                json!({ "message": message })
            }
        }
    }

    /// Check if this is an upload pipeline event
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            Notification::UploadStdout { .. }
                | Notification::UploadSuccess
                | Notification::UploadError { .. }
        )
    }
}

/// Anything the session sends to the remote peer outside a completion
#[derive(Debug)]
pub enum Outbound {
    /// Fire-and-forget notification
    Notification(Notification),

    /// Request expecting a reply from the peer
    Request {
        /// Remote method name
        method: String,
        /// Remote params
        params: Value,
        /// Channel receiving the peer's reply
        reply: oneshot::Sender<Result<Value, RpcError>>,
    },
}
