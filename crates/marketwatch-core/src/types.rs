//! Shared types for the watch pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::WatchError;

// ─── RawLog ───────────────────────────────────────────────────────────────────

/// A log entry exactly as the chain source returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Block the log was included in.
    pub block_number: u64,
    /// Index of the emitting transaction within the block.
    pub transaction_index: u64,
    /// Index of the log within the block.
    pub log_index: u64,
    /// Contract that emitted the log (`0x…`).
    pub address: String,
    /// Transaction hash (`0x…`), kept for diagnostics.
    pub transaction_hash: String,
    /// Topics, `topics[0]` being the event signature hash (`0x…`).
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed payload.
    pub data: Vec<u8>,
    /// `true` if a reorg invalidated a previously delivered log.
    pub removed: bool,
}

impl RawLog {
    /// The event signature topic, if any.
    pub fn signature(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    /// Position of this log in the chain, used for ordering.
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            block_index: self.transaction_index,
            log_index: self.log_index,
        }
    }
}

// ─── EventPosition ────────────────────────────────────────────────────────────

/// Where an event sits in the chain. Orders by block, then transaction index,
/// then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    /// Transaction index inside the block.
    pub block_index: u64,
    pub log_index: u64,
}

impl PartialOrd for EventPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.block_number, self.block_index, self.log_index).cmp(&(
            other.block_number,
            other.block_index,
            other.log_index,
        ))
    }
}

// ─── ProductId ────────────────────────────────────────────────────────────────

/// Product identifier: the 32-byte id as lowercase hex without the `0x` prefix.
///
/// Every code path builds ids through [`ProductId::from_hex`], so the same log
/// yields the same identifier whether it arrived through catch-up or live mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn from_hex(raw: &str) -> Result<Self, WatchError> {
        let lower = raw.to_ascii_lowercase();
        let body = lower
            .strip_prefix("0x")
            .ok_or_else(|| WatchError::Config(format!("product id '{raw}' lacks 0x prefix")))?;
        if body.len() != 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WatchError::Config(format!(
                "product id '{raw}' is not a 32-byte hex value"
            )));
        }
        Ok(Self(body.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Currency ─────────────────────────────────────────────────────────────────

/// Pricing currency as declared by the marketplace contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "DATA")]
    Data,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    /// Map the contract's on-chain enum value.
    pub fn from_repr(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::Usd),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ─── DomainEvent ──────────────────────────────────────────────────────────────

/// Product pricing and ownership terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTerms {
    pub owner: String,
    pub beneficiary: String,
    /// Normalized price per second as decimal digits.
    pub price_per_second: String,
    pub currency: Currency,
    /// Minimum subscription length in seconds, as decimal digits.
    pub minimum_subscription_seconds: String,
}

/// What happened, one variant per recognised contract effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// `terms` is `None` for a redeploy, whose log carries no pricing.
    ProductDeployed {
        product_id: ProductId,
        terms: Option<ProductTerms>,
    },
    ProductUndeployed {
        product_id: ProductId,
    },
    ProductUpdated {
        product_id: ProductId,
        terms: ProductTerms,
    },
    Subscribed {
        product_id: ProductId,
        subscriber: String,
        /// Subscription end as a unix timestamp, decimal digits.
        ends_at: String,
    },
    /// A log the watcher does not act on. `signature` is the event name when
    /// known, otherwise the raw signature topic.
    Ignored {
        signature: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductDeployed { .. } => "ProductDeployed",
            Self::ProductUndeployed { .. } => "ProductUndeployed",
            Self::ProductUpdated { .. } => "ProductUpdated",
            Self::Subscribed { .. } => "Subscribed",
            Self::Ignored { .. } => "Ignored",
        }
    }

    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::ProductDeployed { product_id, .. }
            | Self::ProductUndeployed { product_id }
            | Self::ProductUpdated { product_id, .. }
            | Self::Subscribed { product_id, .. } => Some(product_id),
            Self::Ignored { .. } => None,
        }
    }
}

/// A normalized event ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub position: EventPosition,
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn new(position: EventPosition, kind: EventKind) -> Self {
        Self { position, kind }
    }

    pub fn block_number(&self) -> u64 {
        self.position.block_number
    }

    /// Transaction index inside the block.
    pub fn block_index(&self) -> u64 {
        self.position.block_index
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.kind, EventKind::Ignored { .. })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0x6a3f1c9e00000000000000000000000000000000000000000000000000000001";

    #[test]
    fn product_id_strips_prefix_and_lowercases() {
        let id = ProductId::from_hex(ID).unwrap();
        assert_eq!(id.as_str(), &ID[2..]);
        let upper = ProductId::from_hex(&format!("0x{}", ID[2..].to_uppercase())).unwrap();
        assert_eq!(upper, id);
    }

    #[test]
    fn product_id_rejects_short_or_unprefixed() {
        assert!(ProductId::from_hex("0x1234").is_err());
        assert!(ProductId::from_hex(&ID[2..]).is_err());
    }

    #[test]
    fn positions_order_by_block_then_tx_then_log() {
        let a = EventPosition { block_number: 100, block_index: 3, log_index: 9 };
        let b = EventPosition { block_number: 100, block_index: 4, log_index: 0 };
        let c = EventPosition { block_number: 101, block_index: 0, log_index: 0 };
        let mut v = vec![c, b, a];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn currency_from_repr() {
        assert_eq!(Currency::from_repr(0), Some(Currency::Data));
        assert_eq!(Currency::from_repr(1), Some(Currency::Usd));
        assert_eq!(Currency::from_repr(2), None);
        assert_eq!(Currency::Data.to_string(), "DATA");
    }
}
