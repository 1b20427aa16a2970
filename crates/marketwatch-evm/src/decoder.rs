//! `MarketplaceDecoder`: turns marketplace contract logs into domain events.
//!
//! | Contract event             | Domain event                         |
//! |----------------------------|--------------------------------------|
//! | `ProductCreated`           | `ProductDeployed` with terms         |
//! | `ProductRedeployed`        | `ProductDeployed` without terms      |
//! | `ProductDeleted`           | `ProductUndeployed`                  |
//! | `ProductUpdated`           | `ProductUpdated`                     |
//! | `ProductOwnershipChanged`  | `ProductUpdated`, terms via `getProduct` |
//! | `Subscribed`               | `Subscribed`                         |
//! | anything else              | `Ignored`                            |

use async_trait::async_trait;
use alloy_primitives::U256;
use std::sync::Arc;

use marketwatch_core::error::WatchError;
use marketwatch_core::source::{ChainSource, EventDecoder};
use marketwatch_core::types::{Currency, DomainEvent, EventKind, ProductId, ProductTerms, RawLog};

use crate::abi::{
    decode_get_product, decode_product_payload, decode_subscribed_payload, get_product_calldata,
    normalize_price, topic_address, topic_product_id, AbiError, MarketplaceEvent,
};

pub struct MarketplaceDecoder {
    source: Arc<dyn ChainSource>,
    contract: String,
}

impl MarketplaceDecoder {
    /// `source` serves the `getProduct` reads for ownership changes.
    pub fn new(source: Arc<dyn ChainSource>, contract: impl Into<String>) -> Self {
        Self {
            source,
            contract: contract.into(),
        }
    }

    /// Current terms of `product_id`, read from contract state.
    async fn current_terms(&self, block_number: u64, product_id: &ProductId) -> Result<ProductTerms, WatchError> {
        let state_error = |reason: String| WatchError::StateRead {
            block_number,
            product_id: product_id.to_string(),
            reason,
        };
        let result = self
            .source
            .read_state(&self.contract, get_product_calldata(product_id))
            .await
            .map_err(|e| state_error(e.to_string()))?;
        let state = decode_get_product(&result).map_err(|e| state_error(e.to_string()))?;
        tracing::debug!(block = block_number, product = %product_id, name = %state.name, owner = %state.owner, "Read current product terms");
        terms(
            state.owner,
            state.beneficiary,
            state.price_per_second,
            state.currency,
            state.minimum_subscription_seconds,
        )
        .map_err(|e| state_error(e.to_string()))
    }
}

#[async_trait]
impl EventDecoder for MarketplaceDecoder {
    async fn decode(&self, log: &RawLog) -> Result<DomainEvent, WatchError> {
        let Some(topic0) = log.signature() else {
            tracing::debug!(block = log.block_number, "Anonymous log");
            return Ok(ignored(log, String::new()));
        };
        let Some(event) = MarketplaceEvent::from_topic(topic0) else {
            tracing::debug!(block = log.block_number, signature = topic0, "Unknown event signature");
            return Ok(ignored(log, topic0.to_ascii_lowercase()));
        };

        let kind = match event {
            MarketplaceEvent::ProductOwnershipChanged => {
                let product_id = topic_product_id(&log.topics, 2).map_err(|e| decode_error(log, event, e))?;
                let terms = self.current_terms(log.block_number, &product_id).await?;
                EventKind::ProductUpdated { product_id, terms }
            }
            _ => decode_payload(event, log).map_err(|e| decode_error(log, event, e))?,
        };
        Ok(DomainEvent::new(log.position(), kind))
    }
}

/// Events whose domain form follows from the log alone.
fn decode_payload(event: MarketplaceEvent, log: &RawLog) -> Result<EventKind, AbiError> {
    let topics = &log.topics;
    let kind = match event {
        MarketplaceEvent::ProductCreated | MarketplaceEvent::ProductUpdated => {
            let owner = topic_address(topics, 1)?;
            let product_id = topic_product_id(topics, 2)?;
            let p = decode_product_payload(&log.data)?;
            tracing::debug!(block = log.block_number, product = %product_id, name = %p.name, event = event.name(), "Product payload");
            let terms = terms(owner, p.beneficiary, p.price_per_second, p.currency, p.minimum_subscription_seconds)?;
            if event == MarketplaceEvent::ProductCreated {
                EventKind::ProductDeployed { product_id, terms: Some(terms) }
            } else {
                EventKind::ProductUpdated { product_id, terms }
            }
        }
        MarketplaceEvent::ProductRedeployed => EventKind::ProductDeployed {
            product_id: topic_product_id(topics, 2)?,
            terms: None,
        },
        MarketplaceEvent::ProductDeleted => EventKind::ProductUndeployed {
            product_id: topic_product_id(topics, 2)?,
        },
        MarketplaceEvent::Subscribed => EventKind::Subscribed {
            product_id: topic_product_id(topics, 1)?,
            subscriber: topic_address(topics, 2)?,
            ends_at: decode_subscribed_payload(&log.data)?.to_string(),
        },
        other => {
            tracing::warn!(block = log.block_number, event = other.name(), "Marketplace event not acted on");
            EventKind::Ignored { signature: other.name().to_string() }
        }
    };
    Ok(kind)
}

fn terms(
    owner: String,
    beneficiary: String,
    price: U256,
    currency: u8,
    minimum_subscription_seconds: U256,
) -> Result<ProductTerms, AbiError> {
    Ok(ProductTerms {
        owner,
        beneficiary,
        price_per_second: normalize_price(price),
        currency: Currency::from_repr(currency).ok_or(AbiError::UnknownCurrency(currency.into()))?,
        minimum_subscription_seconds: minimum_subscription_seconds.to_string(),
    })
}

fn ignored(log: &RawLog, signature: String) -> DomainEvent {
    DomainEvent::new(log.position(), EventKind::Ignored { signature })
}

fn decode_error(log: &RawLog, event: MarketplaceEvent, e: AbiError) -> WatchError {
    WatchError::Decode {
        block_number: log.block_number,
        signature: event.name().to_string(),
        reason: e.to_string(),
    }
}
