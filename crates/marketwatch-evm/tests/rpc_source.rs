//! `RpcChainSource` against a mocked JSON-RPC node.

use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use marketwatch_core::error::WatchError;
use marketwatch_core::source::ChainSource;
use marketwatch_core::types::RawLog;
use marketwatch_evm::{HttpTransportConfig, RetryConfig, RpcChainSource, RpcSourceConfig};

const CONTRACT: &str = "0x2b3f2887c697b3f4f8d9f818c95482e1a3a759a5";

async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": result
        })))
        .mount(server)
        .await;
}

async fn mock_error(server: &MockServer, rpc_method: &str, code: i64, message: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message }
        })))
        .mount(server)
        .await;
}

fn source(server: &MockServer) -> RpcChainSource {
    let mut config = RpcSourceConfig::new(server.uri());
    config.http = HttpTransportConfig {
        retry: RetryConfig {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    RpcChainSource::new(config).unwrap()
}

fn rpc_log(block: u64, tx: u64, index: u64) -> Value {
    json!({
        "address": CONTRACT,
        "topics": ["0xABCDEF0000000000000000000000000000000000000000000000000000000001"],
        "data": "0x00ff",
        "blockNumber": format!("0x{block:x}"),
        "transactionHash": format!("0x{block:064x}"),
        "transactionIndex": format!("0x{tx:x}"),
        "logIndex": format!("0x{index:x}"),
        "removed": false
    })
}

#[tokio::test]
async fn reads_chain_id_and_height() {
    let server = MockServer::start().await;
    mock_result(&server, "eth_chainId", json!("0x89")).await;
    mock_result(&server, "eth_blockNumber", json!("0x10d4f")).await;

    let source = source(&server);
    assert_eq!(source.chain_id().await.unwrap(), 137);
    assert_eq!(source.current_height().await.unwrap(), 68_943);
}

#[tokio::test]
async fn get_logs_sends_filter_and_parses_logs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getLogs",
            "params": [{ "fromBlock": "0x64", "toBlock": "0xc8", "address": CONTRACT }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": [rpc_log(100, 2, 5), rpc_log(150, 0, 0)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let logs = source(&server).get_logs(100, 200, CONTRACT).await.unwrap();

    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].block_number, 100);
    assert_eq!(logs[0].transaction_index, 2);
    assert_eq!(logs[0].log_index, 5);
    assert_eq!(logs[0].data, vec![0x00, 0xff]);
    assert_eq!(
        logs[0].signature(),
        Some("0xabcdef0000000000000000000000000000000000000000000000000000000001")
    );
    assert_eq!(logs[1].block_number, 150);
}

#[tokio::test]
async fn oversized_range_is_reported_as_such() {
    let server = MockServer::start().await;
    mock_error(&server, "eth_getLogs", -32005, "query returned more than 10000 results").await;

    let err = source(&server).get_logs(1, 500_000, CONTRACT).await.unwrap_err();

    assert!(matches!(err, WatchError::RangeTooLarge { from: 1, to: 500_000, .. }));
}

#[tokio::test]
async fn rate_limited_log_query_is_not_a_range_error() {
    let server = MockServer::start().await;
    mock_error(&server, "eth_getLogs", -32005, "daily request count exceeded, request rate limited").await;

    let err = source(&server).get_logs(1, 1000, CONTRACT).await.unwrap_err();

    assert!(matches!(err, WatchError::Rpc(ref msg) if msg.contains("rate limited")), "got {err}");
    assert!(!err.is_range_too_large());
}

#[tokio::test]
async fn other_log_errors_are_plain_rpc_errors() {
    let server = MockServer::start().await;
    mock_error(&server, "eth_getLogs", -32000, "header not found").await;

    let err = source(&server).get_logs(1, 10, CONTRACT).await.unwrap_err();

    assert!(matches!(err, WatchError::Rpc(ref msg) if msg.contains("header not found")));
}

#[tokio::test]
async fn read_state_posts_eth_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [{ "to": CONTRACT, "data": "0xdeadbeef" }, "latest"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0x0102"
        })))
        .mount(&server)
        .await;

    let result = source(&server)
        .read_state(CONTRACT, vec![0xde, 0xad, 0xbe, 0xef])
        .await
        .unwrap();
    assert_eq!(result, vec![1, 2]);
}

#[tokio::test]
async fn reverted_call_is_an_error() {
    let server = MockServer::start().await;
    mock_error(&server, "eth_call", 3, "execution reverted").await;

    let err = source(&server).read_state(CONTRACT, vec![1]).await.unwrap_err();
    assert!(matches!(err, WatchError::Rpc(_)));
}

#[tokio::test]
async fn get_code_distinguishes_contracts() {
    let server = MockServer::start().await;
    mock_result(&server, "eth_getCode", json!("0x6080")).await;

    assert_eq!(source(&server).get_code(CONTRACT).await.unwrap(), vec![0x60, 0x80]);
}

#[tokio::test]
async fn unreachable_node_is_an_rpc_error() {
    let mut config = RpcSourceConfig::new("http://127.0.0.1:1");
    config.http.retry.max_retries = 0;
    let source = RpcChainSource::new(config).unwrap();

    assert!(matches!(source.current_height().await, Err(WatchError::Rpc(_))));
}

// ─── HTTP polling ─────────────────────────────────────────────────────────────

fn polling_source(server: &MockServer, chunk_size: u64) -> RpcChainSource {
    let mut config = RpcSourceConfig::new(server.uri());
    config.http.retry.max_retries = 0;
    config.poll_interval = Duration::from_millis(5);
    config.chunk_size = chunk_size;
    RpcChainSource::new(config).unwrap()
}

/// `(fromBlock, toBlock)` of every `eth_getLogs` the server saw.
async fn log_queries(server: &MockServer) -> Vec<(u64, u64)> {
    let quantity = |v: &Value| u64::from_str_radix(v.as_str().unwrap().trim_start_matches("0x"), 16).unwrap();
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|req| serde_json::from_slice::<Value>(&req.body).unwrap())
        .filter(|body| body["method"] == "eth_getLogs")
        .map(|body| (quantity(&body["params"][0]["fromBlock"]), quantity(&body["params"][0]["toBlock"])))
        .collect()
}

async fn next_live(stream: &mut marketwatch_core::source::LogStream) -> RawLog {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("no live log in time")
        .expect("stream ended")
        .unwrap()
}

#[tokio::test]
async fn polling_respects_chunk_size_and_halves_on_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": "0xa"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mock_result(&server, "eth_blockNumber", json!("0x1388")).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getLogs",
            "params": [{ "fromBlock": "0xb", "toBlock": "0x6e", "address": CONTRACT }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32005, "message": "query returned more than 10000 results" }
        })))
        .mount(&server)
        .await;
    mock_result(&server, "eth_getLogs", json!([rpc_log(11, 0, 0)])).await;

    let mut stream = polling_source(&server, 100).subscribe(CONTRACT, None).await.unwrap();
    assert_eq!(next_live(&mut stream).await.block_number, 11);
    drop(stream);

    let queries = log_queries(&server).await;
    assert_eq!(&queries[..2], &[(11, 110), (11, 60)]);
    assert!(queries.iter().all(|(from, to)| to - from < 100), "{queries:?}");
}

#[tokio::test]
async fn polling_resumes_from_requested_block() {
    let server = MockServer::start().await;
    mock_result(&server, "eth_blockNumber", json!("0x14")).await;
    mock_result(&server, "eth_getLogs", json!([rpc_log(15, 0, 0)])).await;

    let mut stream = polling_source(&server, 1000).subscribe(CONTRACT, Some(12)).await.unwrap();
    assert_eq!(next_live(&mut stream).await.block_number, 15);
    drop(stream);

    assert_eq!(log_queries(&server).await[0], (12, 20));
}
