//! End-to-end catch-up and live playback over ABI-encoded marketplace logs.

mod common;

use alloy_primitives::U256;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use marketwatch_core::checkpoint::MemoryCheckpointStore;
use marketwatch_core::config::{WatcherConfig, WatcherState};
use marketwatch_core::engine::PlaybackEngine;
use marketwatch_core::error::WatchError;
use marketwatch_core::source::{EventDecoder, MemoryChainSource};
use marketwatch_core::types::{Currency, EventKind, ProductId};
use marketwatch_evm::abi::get_product_calldata;
use marketwatch_evm::{MarketplaceDecoder, PRICE_SCALE};

struct Setup {
    source: Arc<MemoryChainSource>,
    store: Arc<MemoryCheckpointStore>,
    recorder: Arc<Recorder>,
    engine: Arc<PlaybackEngine>,
}

fn setup(store: MemoryCheckpointStore, chunk_size: u64, source: MemoryChainSource) -> Setup {
    let source = Arc::new(source);
    let store = Arc::new(store);
    let recorder = Arc::new(Recorder::default());
    let decoder = MarketplaceDecoder::new(source.clone(), CONTRACT);
    let engine = PlaybackEngine::new(
        WatcherConfig {
            contract_address: CONTRACT.into(),
            chunk_size,
            ..Default::default()
        },
        source.clone(),
        Arc::new(decoder),
        dispatcher_with(recorder.clone()),
        Box::new(store.clone()),
    )
    .unwrap();
    Setup {
        source,
        store,
        recorder,
        engine: Arc::new(engine),
    }
}

fn decoder_over(source: &Arc<MemoryChainSource>) -> MarketplaceDecoder {
    MarketplaceDecoder::new(source.clone(), CONTRACT)
}

#[tokio::test]
async fn created_event_price_is_scaled() {
    let source = Arc::new(MemoryChainSource::new(1));
    let event = decoder_over(&source)
        .decode(&created(100, 7, PRICE_SCALE, 0))
        .await
        .unwrap();

    assert_eq!(event.block_number(), 100);
    let EventKind::ProductDeployed { product_id, terms: Some(terms) } = event.kind else {
        panic!("expected deployed with terms, got {:?}", event.kind);
    };
    assert_eq!(product_id.as_str(), product_hex(7));
    assert_eq!(terms.price_per_second, "1");
    assert_eq!(terms.currency, Currency::Data);
    assert_eq!(terms.owner, OWNER);
    assert_eq!(terms.beneficiary, BENEFICIARY);
    assert_eq!(terms.minimum_subscription_seconds, "60");
}

#[tokio::test]
async fn catch_up_delivers_window_in_chain_order() {
    let s = setup(MemoryCheckpointStore::starting_at(99), 1000, MemoryChainSource::new(1));
    s.source.push_log(subscribed(115, 7, 1_700_000_000));
    s.source.push_log(redeployed(110, 7));
    s.source.push_log(deleted(105, 7));
    s.source.push_log(created(100, 7, PRICE_SCALE, 1));
    s.source.set_height(120);

    s.engine.catch_up().await.unwrap();

    assert_eq!(
        s.recorder.names(),
        vec!["ProductDeployed", "ProductUndeployed", "ProductDeployed", "Subscribed"]
    );
    assert_eq!(s.source.queries(), vec![(100, 120)]);
    assert_eq!(s.engine.checkpoint().await, 120);
    assert_eq!(s.store.writes(), vec![99, 120]);

    let events = s.recorder.events();
    assert!(matches!(&events[2].kind, EventKind::ProductDeployed { terms: None, .. }));
    let EventKind::Subscribed { subscriber, ends_at, .. } = &events[3].kind else {
        panic!("expected subscription");
    };
    assert_eq!(subscriber, SUBSCRIBER);
    assert_eq!(ends_at, "1700000000");
}

#[tokio::test]
async fn unknown_signature_is_not_delivered() {
    let s = setup(MemoryCheckpointStore::new(), 1000, MemoryChainSource::new(1));
    let log = unknown(3);
    let topic = log.topics[0].clone();
    s.source.push_log(log.clone());
    s.source.push_log(deleted(4, 1));

    let event = decoder_over(&s.source).decode(&log).await.unwrap();
    assert_eq!(event.kind, EventKind::Ignored { signature: topic });

    let report = s.engine.catch_up().await.unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(s.recorder.names(), vec!["ProductUndeployed"]);
    assert_eq!(s.engine.checkpoint().await, 4);
}

#[tokio::test]
async fn known_unmapped_events_carry_their_name() {
    let source = Arc::new(MemoryChainSource::new(1));
    let event = decoder_over(&source)
        .decode(&new_subscription(9, 1, 1_700_000_000))
        .await
        .unwrap();
    assert_eq!(event.kind, EventKind::Ignored { signature: "NewSubscription".into() });
}

#[tokio::test]
async fn ownership_change_reads_current_terms() {
    let source = Arc::new(MemoryChainSource::new(1));
    let id = ProductId::from_hex(&product_topic(42)).unwrap();
    let price = PRICE_SCALE * U256::from(5) / U256::from(2);
    source.set_call_result(get_product_calldata(&id), get_product_result(SUBSCRIBER, price, 1));

    let event = decoder_over(&source).decode(&ownership_changed(200, 42)).await.unwrap();

    let EventKind::ProductUpdated { product_id, terms } = event.kind else {
        panic!("expected update, got {:?}", event.kind);
    };
    assert_eq!(product_id, id);
    assert_eq!(terms.owner, SUBSCRIBER);
    assert_eq!(terms.price_per_second, "2");
    assert_eq!(terms.currency, Currency::Usd);
    assert_eq!(terms.minimum_subscription_seconds, "86400");
}

#[tokio::test]
async fn failed_state_read_fails_the_window() {
    let s = setup(MemoryCheckpointStore::new(), 1000, MemoryChainSource::new(1));
    s.source.push_log(deleted(1, 42));
    s.source.push_log(ownership_changed(2, 42));

    let err = s.engine.catch_up().await.unwrap_err();

    assert!(matches!(err, WatchError::StateRead { block_number: 2, .. }));
    assert!(s.recorder.events().is_empty());
    assert!(s.store.writes().is_empty());
    assert_eq!(s.engine.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn unknown_currency_is_a_decode_failure() {
    let source = Arc::new(MemoryChainSource::new(1));
    let err = decoder_over(&source)
        .decode(&created(5, 1, PRICE_SCALE, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::Decode { ref signature, .. } if signature == "ProductCreated"));
}

#[tokio::test]
async fn truncated_payload_is_a_decode_failure() {
    let source = Arc::new(MemoryChainSource::new(1));
    let mut log = updated(5, 1, PRICE_SCALE);
    log.data.truncate(40);
    let err = decoder_over(&source).decode(&log).await.unwrap_err();
    assert!(matches!(err, WatchError::Decode { block_number: 5, .. }));
}

#[tokio::test]
async fn replaying_a_range_is_idempotent() {
    let s = setup(MemoryCheckpointStore::new(), 1000, MemoryChainSource::new(1));
    for log in [created(10, 1, PRICE_SCALE, 0), updated(12, 1, PRICE_SCALE * U256::from(2)), deleted(14, 1)] {
        s.source.push_log(log);
    }

    s.engine.replay_range(10, 14).await.unwrap();
    let first = s.recorder.events();
    s.engine.replay_range(10, 14).await.unwrap();
    let all = s.recorder.events();

    assert_eq!(first.len(), 3);
    assert_eq!(&all[3..], &first[..]);
}

#[tokio::test]
async fn window_size_does_not_change_events() {
    let mut runs = vec![];
    for chunk in [1000, 4, 1] {
        let s = setup(MemoryCheckpointStore::new(), chunk, MemoryChainSource::new(1));
        for log in [
            created(2, 1, PRICE_SCALE, 0),
            subscribed(5, 1, 99),
            unknown(6),
            deleted(9, 1),
            redeployed(13, 1),
        ] {
            s.source.push_log(log);
        }
        s.engine.catch_up().await.unwrap();
        runs.push(s.recorder.events());
    }
    assert_eq!(runs[0].len(), 4);
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[tokio::test]
async fn product_id_is_the_same_live_and_historical() {
    let s = setup(MemoryCheckpointStore::new(), 1000, MemoryChainSource::new(1));
    s.source.push_log(created(5, 77, PRICE_SCALE, 0));

    let task = tokio::spawn({
        let engine = s.engine.clone();
        async move { engine.run().await }
    });
    for _ in 0..200 {
        if s.engine.state() == WatcherState::Live {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    s.source.push_live(created(5, 77, PRICE_SCALE, 0));
    for _ in 0..200 {
        if s.recorder.events().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    s.engine.shutdown();
    task.await.unwrap().unwrap();

    let ids: Vec<_> = s
        .recorder
        .events()
        .iter()
        .map(|e| e.kind.product_id().cloned())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0].as_ref().map(|p| p.as_str().to_string()), Some(product_hex(77)));
}
