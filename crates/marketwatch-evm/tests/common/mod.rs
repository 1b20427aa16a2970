//! Shared fixtures: ABI-encoded marketplace logs and a recording handler.

#![allow(dead_code)]

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use marketwatch_core::dispatcher::{Dispatcher, EventHandler};
use marketwatch_core::error::WatchError;
use marketwatch_core::types::{DomainEvent, RawLog};
use marketwatch_evm::MarketplaceEvent;

pub const CONTRACT: &str = "0x2b3f2887c697b3f4f8d9f818c95482e1a3a759a5";
pub const OWNER: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
pub const BENEFICIARY: &str = "0x00000000219ab540356cBB839Cbe05303d7705Fa";
pub const SUBSCRIBER: &str = "0xBE0eB53F46cd790Cd13851d5EFf43D12404d33E8";

pub fn address(a: &str) -> Address {
    a.parse().unwrap()
}

pub fn address_topic(a: &str) -> String {
    format!("0x{:0>64}", hex::encode(address(a)))
}

pub fn product_topic(n: u64) -> String {
    format!("0x{n:064x}")
}

pub fn product_hex(n: u64) -> String {
    format!("{n:064x}")
}

pub fn raw_log(block: u64, tx_index: u64, topics: Vec<String>, data: Vec<u8>) -> RawLog {
    RawLog {
        block_number: block,
        transaction_index: tx_index,
        log_index: 0,
        address: CONTRACT.into(),
        transaction_hash: format!("0x{block:064x}"),
        topics,
        data,
        removed: false,
    }
}

pub fn product_terms_data(price: U256, currency: u8, min_seconds: u64) -> Vec<u8> {
    DynSolValue::Tuple(vec![
        DynSolValue::String("weather feed".into()),
        DynSolValue::Address(address(BENEFICIARY)),
        DynSolValue::Uint(price, 256),
        DynSolValue::Uint(U256::from(currency), 8),
        DynSolValue::Uint(U256::from(min_seconds), 256),
    ])
    .abi_encode_params()
}

pub fn created(block: u64, product: u64, price: U256, currency: u8) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::ProductCreated.topic().into(),
            address_topic(OWNER),
            product_topic(product),
        ],
        product_terms_data(price, currency, 60),
    )
}

pub fn updated(block: u64, product: u64, price: U256) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::ProductUpdated.topic().into(),
            address_topic(OWNER),
            product_topic(product),
        ],
        product_terms_data(price, 0, 60),
    )
}

pub fn deleted(block: u64, product: u64) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::ProductDeleted.topic().into(),
            address_topic(OWNER),
            product_topic(product),
        ],
        vec![],
    )
}

pub fn redeployed(block: u64, product: u64) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::ProductRedeployed.topic().into(),
            address_topic(OWNER),
            product_topic(product),
        ],
        vec![],
    )
}

pub fn subscribed(block: u64, product: u64, ends_at: u64) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::Subscribed.topic().into(),
            product_topic(product),
            address_topic(SUBSCRIBER),
        ],
        DynSolValue::Uint(U256::from(ends_at), 256).abi_encode_params(),
    )
}

pub fn new_subscription(block: u64, product: u64, ends_at: u64) -> RawLog {
    let mut log = subscribed(block, product, ends_at);
    log.topics[0] = MarketplaceEvent::NewSubscription.topic().into();
    log
}

pub fn ownership_changed(block: u64, product: u64) -> RawLog {
    raw_log(
        block,
        0,
        vec![
            MarketplaceEvent::ProductOwnershipChanged.topic().into(),
            address_topic(SUBSCRIBER),
            product_topic(product),
            address_topic(OWNER),
        ],
        vec![],
    )
}

pub fn unknown(block: u64) -> RawLog {
    raw_log(block, 0, vec![format!("0x{}", "ab".repeat(32))], vec![])
}

/// ABI-encoded `getProduct` return value.
pub fn get_product_result(owner: &str, price: U256, currency: u8) -> Vec<u8> {
    DynSolValue::Tuple(vec![
        DynSolValue::String("weather feed".into()),
        DynSolValue::Address(address(owner)),
        DynSolValue::Address(address(BENEFICIARY)),
        DynSolValue::Uint(price, 256),
        DynSolValue::Uint(U256::from(currency), 8),
        DynSolValue::Uint(U256::from(86_400u64), 256),
        DynSolValue::Uint(U256::from(1u8), 8),
        DynSolValue::Address(Address::ZERO),
    ])
    .abi_encode_params()
}

/// Remembers every event it is handed.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<DomainEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind.name()).collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), WatchError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn dispatcher_with(recorder: Arc<Recorder>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(recorder);
    dispatcher
}
