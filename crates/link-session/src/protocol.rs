//! Session protocol surface
//!
//! Method names and parameter shapes of the calls a peer can make. Params
//! are decoded with serde; anything that fails to decode is an
//! `InvalidRequest` returned through the call's completion.

use std::fmt;
use std::str::FromStr;

use link_detect::DiscoveryFilters;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::data::Encoding;
use crate::driver::PeripheralConfig;
use crate::error::SessionError;
use crate::upload::UploadConfig;

/// Reason given when `discover` carries no usable filters
pub const MISSING_FILTERS: &str = "discovery request must include filters";

/// Callable methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Discover,
    Connect,
    Disconnect,
    Write,
    Read,
    Upload,
    /// Legacy stub, always `[]`
    GetServices,
    /// Completes with `"willPing"` then pings the peer
    PingMe,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Discover,
        Method::Connect,
        Method::Disconnect,
        Method::Write,
        Method::Read,
        Method::Upload,
        Method::GetServices,
        Method::PingMe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Discover => "discover",
            Method::Connect => "connect",
            Method::Disconnect => "disconnect",
            Method::Write => "write",
            Method::Read => "read",
            Method::Upload => "upload",
            Method::GetServices => "getServices",
            Method::PingMe => "pingMe",
        }
    }
}

impl FromStr for Method {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SessionError::MethodNotFound(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `discover` params
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverParams {
    #[serde(default)]
    pub filters: Option<DiscoveryFilters>,
}

impl DiscoverParams {
    /// The filters, provided they contain at least one pattern
    pub fn into_filters(self) -> Result<DiscoveryFilters, SessionError> {
        let filters = self
            .filters
            .ok_or_else(|| SessionError::InvalidRequest(MISSING_FILTERS.into()))?;
        filters
            .validate()
            .map_err(|_| SessionError::InvalidRequest(MISSING_FILTERS.into()))?;
        Ok(filters)
    }
}

/// `peripheralConfig` wrapper of `connect`
#[derive(Debug, Clone, Deserialize)]
pub struct PeripheralConfigParams {
    pub config: PeripheralConfig,
}

/// `connect` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub peripheral_id: String,
    pub peripheral_config: PeripheralConfigParams,
}

/// `write` params
#[derive(Debug, Clone, Deserialize)]
pub struct WriteParams {
    pub message: String,
    #[serde(default)]
    pub encoding: Encoding,
}

/// `upload` params
#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    pub message: String,
    pub config: UploadConfig,
    #[serde(default)]
    pub encoding: Encoding,
}

/// Decode call params; a missing params value reads as `{}`
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, SessionError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| SessionError::InvalidRequest(e.to_string()))
}
