//! JSON-RPC 2.0 wire types and transport errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use marketwatch_core::error::WatchError;

/// A JSON-RPC 2.0 request. Ids are always numeric on the way out.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response. Only `result` and `error` are read; a node may
/// answer a malformed request with a null id.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, 5xx, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    /// The node answered with something we could not interpret.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_)) || self.is_rate_limited()
    }

    /// Returns `true` for throttling, whether signalled by HTTP 429 or by a
    /// JSON-RPC error. Infura reports both throttling and oversized log
    /// queries as `-32005`, so only the message tells them apart.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Rpc(err) => {
                let message = err.message.to_ascii_lowercase();
                RATE_LIMIT_MESSAGES.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }

    /// Returns `true` if the node refused an `eth_getLogs` range as too large.
    ///
    /// Providers disagree on the error code, so the message has to name the
    /// block range or the result count.
    pub fn is_range_too_large(&self) -> bool {
        let Self::Rpc(err) = self else {
            return false;
        };
        if self.is_rate_limited() {
            return false;
        }
        let message = err.message.to_ascii_lowercase();
        (err.code == -32602 && message.contains("range"))
            || RANGE_MESSAGES.iter().any(|m| message.contains(m))
    }

    /// Convert into the pipeline error for a `get_logs(from, to)` call.
    pub fn into_logs_error(self, from: u64, to: u64) -> WatchError {
        if self.is_range_too_large() {
            WatchError::RangeTooLarge {
                from,
                to,
                reason: self.to_string(),
            }
        } else {
            WatchError::Rpc(self.to_string())
        }
    }
}

const RANGE_MESSAGES: &[&str] = &[
    "block range",
    "more than 10000 results",
    "query returned more than",
    "range too large",
    "exceed maximum block range",
];

const RATE_LIMIT_MESSAGES: &[&str] = &[
    "rate limit",
    "request count exceeded",
    "too many requests",
];

impl From<TransportError> for WatchError {
    fn from(e: TransportError) -> Self {
        WatchError::Rpc(e.to_string())
    }
}

// ─── Quantity helpers ─────────────────────────────────────────────────────────

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &Value) -> Result<u64, TransportError> {
    let raw = value
        .as_str()
        .ok_or_else(|| TransportError::Malformed(format!("expected hex quantity, got {value}")))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|e| TransportError::Malformed(format!("bad quantity '{raw}': {e}")))
}

pub fn quantity(n: u64) -> Value {
    Value::String(format!("0x{n:x}"))
}

/// Parse `0x`-prefixed hex bytes.
pub fn parse_bytes(value: &Value) -> Result<Vec<u8>, TransportError> {
    let raw = value
        .as_str()
        .ok_or_else(|| TransportError::Malformed(format!("expected hex data, got {value}")))?;
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| TransportError::Malformed(format!("bad hex data: {e}")))
}
