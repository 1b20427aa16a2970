//! EVM log objects as returned by `eth_getLogs` and `eth_subscribe("logs")`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use marketwatch_core::types::RawLog;

use crate::rpc::{parse_bytes, parse_quantity, TransportError};

/// An EVM log as it appears on the wire. Quantities are hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    /// `None` for pending logs.
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub transaction_index: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        serde_json::from_value(value).map_err(|e| TransportError::Malformed(format!("log object: {e}")))
    }

    /// Convert to the chain-agnostic form. Pending logs (no block yet) are
    /// rejected.
    pub fn into_raw(self) -> Result<RawLog, TransportError> {
        let quantity = |field: &str, v: Option<String>| {
            v.ok_or_else(|| TransportError::Malformed(format!("log without {field}")))
                .and_then(|s| parse_quantity(&Value::String(s)))
        };
        Ok(RawLog {
            block_number: quantity("blockNumber", self.block_number)?,
            transaction_index: quantity("transactionIndex", self.transaction_index)?,
            log_index: quantity("logIndex", self.log_index)?,
            data: parse_bytes(&Value::String(self.data))?,
            address: self.address,
            transaction_hash: self.transaction_hash.unwrap_or_default(),
            topics: self.topics.into_iter().map(|t| t.to_ascii_lowercase()).collect(),
            removed: self.removed,
        })
    }
}

/// Parse a JSON array of log objects.
pub fn parse_logs(value: Value) -> Result<Vec<RawLog>, TransportError> {
    let Value::Array(items) = value else {
        return Err(TransportError::Malformed(format!("expected log array, got {value}")));
    };
    items
        .into_iter()
        .map(|item| RpcLog::from_value(item)?.into_raw())
        .collect()
}
