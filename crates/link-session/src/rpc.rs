//! JSON-RPC 2.0 envelope
//!
//! The peer sends requests and answers the session's own outbound requests;
//! the session answers requests and pushes notifications. Every message is a
//! single JSON document.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::events::{Notification, Outbound};

/// Protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received
pub const PARSE_ERROR: i64 = -32700;
/// The JSON is not a valid request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i64 = -32602;
/// Any other session failure; `data.kind` names it
pub const SESSION_ERROR: i64 = -32000;

/// Error object of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(reason: impl fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("parse error: {}", reason))
    }

    pub fn invalid_request(reason: impl fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, format!("invalid request: {}", reason))
    }
}

impl From<&SessionError> for RpcError {
    fn from(error: &SessionError) -> Self {
        let code = match error {
            SessionError::MethodNotFound(_) => METHOD_NOT_FOUND,
            SessionError::InvalidRequest(_) => INVALID_PARAMS,
            _ => SESSION_ERROR,
        };
        Self {
            code,
            message: error.to_string(),
            data: Some(json!({ "kind": error.kind() })),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

fn version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Deserialize a present field as `Some`, even when it is `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Request (has `id` and `method`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "version")]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Response (has `id`, no `method`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "version")]
    pub jsonrpc: String,
    pub id: Value,
    /// Success result (mutually exclusive with error)
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error result (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn new(id: Value, result: Result<Value, RpcError>) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: version(),
            id,
            result,
            error,
        }
    }

    /// Collapse into the outcome seen by the waiting requester
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Notification (has `method`, no `id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    #[serde(default = "version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl From<&Notification> for RpcNotification {
    fn from(notification: &Notification) -> Self {
        Self {
            jsonrpc: version(),
            method: notification.method().to_string(),
            params: notification.params(),
        }
    }
}

/// Discriminated union of protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(Request),
    Response(Response),
    Notification(RpcNotification),
}

impl RpcMessage {
    /// Parse one JSON document, mapping failures to the matching error object
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text).map_err(RpcError::parse_error)?;
        serde_json::from_value(value).map_err(RpcError::invalid_request)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outbound requests awaiting the peer's answer, keyed by request id
#[derive(Debug, Default)]
pub struct PendingRequests {
    last_id: u64,
    waiting: HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply channel, returning the id to send the request with
    pub fn register(&mut self, reply: oneshot::Sender<Result<Value, RpcError>>) -> u64 {
        self.last_id += 1;
        self.waiting.insert(self.last_id, reply);
        self.last_id
    }

    /// Route a response to its requester; `false` if nobody was waiting
    pub fn resolve(&mut self, response: Response) -> bool {
        let Some(id) = response.id.as_u64() else {
            warn!("Response with non-numeric id {}", response.id);
            return false;
        };
        match self.waiting.remove(&id) {
            Some(reply) => {
                let _ = reply.send(response.into_result());
                true
            }
            None => {
                debug!("No pending request with id {}", id);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Encode an outbound session message, registering requests in `pending`
pub fn encode_outbound(outbound: Outbound, pending: &mut PendingRequests) -> RpcMessage {
    match outbound {
        Outbound::Notification(n) => RpcMessage::Notification(RpcNotification::from(&n)),
        Outbound::Request {
            method,
            params,
            reply,
        } => {
            let id = pending.register(reply);
            RpcMessage::Request(Request {
                jsonrpc: version(),
                id: json!(id),
                method,
                params,
            })
        }
    }
}
