//! Marketplace contract ABI: event signature table, log payload decoding and
//! the `getProduct(bytes32)` state read.
//!
//! topic0 of an EVM log is `keccak256` of the canonical event signature, e.g.
//! `keccak256("Subscribed(bytes32,address,uint256)")`. The table below is
//! hashed once on first use.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, U256};
use std::sync::OnceLock;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use marketwatch_core::types::ProductId;

/// Raw on-chain prices carry 18 decimals.
pub const PRICE_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Errors raised while taking apart a marketplace log or call result.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("missing topic {0}")]
    MissingTopic(usize),

    #[error("invalid topic {index}: {reason}")]
    InvalidTopic { index: usize, reason: String },

    #[error("ABI decode failed: {0}")]
    Payload(String),

    #[error("unexpected value for field '{0}'")]
    UnexpectedValue(&'static str),

    #[error("unknown currency {0}")]
    UnknownCurrency(u64),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// `0x`-prefixed lowercase topic hash of a canonical signature.
pub fn topic_hash(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// ─── Event table ──────────────────────────────────────────────────────────────

/// Every event the marketplace contract emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketplaceEvent {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    ProductRedeployed,
    ProductOwnershipOffered,
    ProductOwnershipChanged,
    Subscribed,
    NewSubscription,
    SubscriptionExtended,
    SubscriptionTransferred,
    ExchangeRatesUpdated,
}

impl MarketplaceEvent {
    pub const ALL: [MarketplaceEvent; 11] = [
        Self::ProductCreated,
        Self::ProductUpdated,
        Self::ProductDeleted,
        Self::ProductRedeployed,
        Self::ProductOwnershipOffered,
        Self::ProductOwnershipChanged,
        Self::Subscribed,
        Self::NewSubscription,
        Self::SubscriptionExtended,
        Self::SubscriptionTransferred,
        Self::ExchangeRatesUpdated,
    ];

    /// Canonical ABI signature. The `Currency` enum is encoded as `uint8`.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::ProductCreated => "ProductCreated(address,bytes32,string,address,uint256,uint8,uint256)",
            Self::ProductUpdated => "ProductUpdated(address,bytes32,string,address,uint256,uint8,uint256)",
            Self::ProductDeleted => "ProductDeleted(address,bytes32)",
            Self::ProductRedeployed => "ProductRedeployed(address,bytes32)",
            Self::ProductOwnershipOffered => "ProductOwnershipOffered(address,bytes32,address)",
            Self::ProductOwnershipChanged => "ProductOwnershipChanged(address,bytes32,address)",
            Self::Subscribed => "Subscribed(bytes32,address,uint256)",
            Self::NewSubscription => "NewSubscription(bytes32,address,uint256)",
            Self::SubscriptionExtended => "SubscriptionExtended(bytes32,address,uint256)",
            Self::SubscriptionTransferred => {
                "SubscriptionTransferred(bytes32,address,address,uint256,uint256)"
            }
            Self::ExchangeRatesUpdated => "ExchangeRatesUpdated(uint256,uint256)",
        }
    }

    pub fn name(&self) -> &'static str {
        let sig = self.signature();
        sig.split('(').next().unwrap_or(sig)
    }

    /// topic0 of logs carrying this event.
    pub fn topic(&self) -> &'static str {
        table()
            .iter()
            .find(|(event, _)| event == self)
            .map(|(_, topic)| topic.as_str())
            .unwrap_or_default()
    }

    /// Look an event up by topic0 (any hex case).
    pub fn from_topic(topic: &str) -> Option<Self> {
        let topic = topic.to_ascii_lowercase();
        table()
            .iter()
            .find(|(_, hash)| *hash == topic)
            .map(|(event, _)| *event)
    }

    /// Whether the event turns into a delivered domain event.
    pub fn is_mapped(&self) -> bool {
        matches!(
            self,
            Self::ProductCreated
                | Self::ProductUpdated
                | Self::ProductDeleted
                | Self::ProductRedeployed
                | Self::ProductOwnershipChanged
                | Self::Subscribed
        )
    }
}

fn table() -> &'static [(MarketplaceEvent, String)] {
    static TABLE: OnceLock<Vec<(MarketplaceEvent, String)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        MarketplaceEvent::ALL
            .iter()
            .map(|event| (*event, topic_hash(event.signature())))
            .collect()
    })
}

// ─── Topics ───────────────────────────────────────────────────────────────────

fn topic_word(topics: &[String], index: usize) -> Result<B256, AbiError> {
    let raw = topics.get(index).ok_or(AbiError::MissingTopic(index))?;
    raw.parse::<B256>().map_err(|e| AbiError::InvalidTopic {
        index,
        reason: e.to_string(),
    })
}

/// Indexed `address` at `topics[index]`, EIP-55 checksummed.
pub fn topic_address(topics: &[String], index: usize) -> Result<String, AbiError> {
    let word = topic_word(topics, index)?;
    Ok(Address::from_word(word).to_checksum(None))
}

/// Indexed `bytes32` product id at `topics[index]`.
pub fn topic_product_id(topics: &[String], index: usize) -> Result<ProductId, AbiError> {
    let word = topic_word(topics, index)?;
    ProductId::from_hex(&format!("{word:#x}")).map_err(|e| AbiError::InvalidTopic {
        index,
        reason: e.to_string(),
    })
}

// ─── Payloads ─────────────────────────────────────────────────────────────────

/// Non-indexed part of `ProductCreated` / `ProductUpdated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPayload {
    pub name: String,
    pub beneficiary: String,
    pub price_per_second: U256,
    pub currency: u8,
    pub minimum_subscription_seconds: U256,
}

/// The terms part of a `getProduct(bytes32)` result. The trailing
/// `state` and `newOwnerCandidate` outputs are decoded but not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductState {
    pub name: String,
    pub owner: String,
    pub beneficiary: String,
    pub price_per_second: U256,
    pub currency: u8,
    pub minimum_subscription_seconds: U256,
}

fn decode_params(types: Vec<DynSolType>, data: &[u8]) -> Result<Vec<DynSolValue>, AbiError> {
    match DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| AbiError::Payload(e.to_string()))?
    {
        DynSolValue::Tuple(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

fn string_at(values: &[DynSolValue], i: usize, field: &'static str) -> Result<String, AbiError> {
    match values.get(i) {
        Some(DynSolValue::String(s)) => Ok(s.clone()),
        _ => Err(AbiError::UnexpectedValue(field)),
    }
}

fn address_at(values: &[DynSolValue], i: usize, field: &'static str) -> Result<String, AbiError> {
    match values.get(i) {
        Some(DynSolValue::Address(a)) => Ok(a.to_checksum(None)),
        _ => Err(AbiError::UnexpectedValue(field)),
    }
}

fn uint_at(values: &[DynSolValue], i: usize, field: &'static str) -> Result<U256, AbiError> {
    match values.get(i) {
        Some(DynSolValue::Uint(u, _)) => Ok(*u),
        _ => Err(AbiError::UnexpectedValue(field)),
    }
}

fn u8_at(values: &[DynSolValue], i: usize, field: &'static str) -> Result<u8, AbiError> {
    let wide = u64::try_from(uint_at(values, i, field)?).map_err(|_| AbiError::UnexpectedValue(field))?;
    u8::try_from(wide).map_err(|_| AbiError::UnexpectedValue(field))
}

pub fn decode_product_payload(data: &[u8]) -> Result<ProductPayload, AbiError> {
    let values = decode_params(
        vec![
            DynSolType::String,
            DynSolType::Address,
            DynSolType::Uint(256),
            DynSolType::Uint(8),
            DynSolType::Uint(256),
        ],
        data,
    )?;
    Ok(ProductPayload {
        name: string_at(&values, 0, "name")?,
        beneficiary: address_at(&values, 1, "beneficiary")?,
        price_per_second: uint_at(&values, 2, "pricePerSecond")?,
        currency: u8_at(&values, 3, "currency")?,
        minimum_subscription_seconds: uint_at(&values, 4, "minimumSubscriptionSeconds")?,
    })
}

/// `endTimestamp` of a `Subscribed` log.
pub fn decode_subscribed_payload(data: &[u8]) -> Result<U256, AbiError> {
    let values = decode_params(vec![DynSolType::Uint(256)], data)?;
    uint_at(&values, 0, "endTimestamp")
}

/// Calldata for `getProduct(bytes32 id)`.
pub fn get_product_calldata(id: &ProductId) -> Vec<u8> {
    let mut calldata = selector("getProduct(bytes32)").to_vec();
    // ProductId is always 64 validated hex digits.
    calldata.extend(hex::decode(id.as_str()).unwrap_or_default());
    calldata
}

pub fn decode_get_product(data: &[u8]) -> Result<ProductState, AbiError> {
    let values = decode_params(
        vec![
            DynSolType::String,
            DynSolType::Address,
            DynSolType::Address,
            DynSolType::Uint(256),
            DynSolType::Uint(8),
            DynSolType::Uint(256),
            DynSolType::Uint(8),
            DynSolType::Address,
        ],
        data,
    )?;
    Ok(ProductState {
        name: string_at(&values, 0, "name")?,
        owner: address_at(&values, 1, "owner")?,
        beneficiary: address_at(&values, 2, "beneficiary")?,
        price_per_second: uint_at(&values, 3, "pricePerSecond")?,
        currency: u8_at(&values, 4, "currency")?,
        minimum_subscription_seconds: uint_at(&values, 5, "minimumSubscriptionSeconds")?,
    })
}

/// Scale a raw on-chain price down by [`PRICE_SCALE`], truncating.
pub fn normalize_price(raw: U256) -> String {
    (raw / PRICE_SCALE).to_string()
}
