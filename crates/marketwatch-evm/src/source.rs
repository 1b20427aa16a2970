//! `RpcChainSource`: the chain source backed by a JSON-RPC node.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use marketwatch_core::error::WatchError;
use marketwatch_core::source::{ChainSource, LogStream};
use marketwatch_core::types::RawLog;

use crate::http::{HttpTransport, HttpTransportConfig};
use crate::log::parse_logs;
use crate::rpc::{parse_bytes, parse_quantity, quantity, TransportError};
use crate::ws::{subscribe_logs, WsConfig};

#[derive(Debug, Clone)]
pub struct RpcSourceConfig {
    pub http_url: String,
    /// Live logs come from `eth_subscribe` here when set, otherwise from
    /// polling `eth_getLogs` over HTTP.
    pub ws_url: Option<String>,
    pub http: HttpTransportConfig,
    pub ws: WsConfig,
    pub poll_interval: Duration,
    /// Largest block range one polling `eth_getLogs` asks for. Set it to the
    /// engine's chunk size.
    pub chunk_size: u64,
}

impl RpcSourceConfig {
    pub fn new(http_url: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into(),
            ws_url: None,
            http: HttpTransportConfig::default(),
            ws: WsConfig::default(),
            poll_interval: Duration::from_secs(4),
            chunk_size: 1000,
        }
    }
}

pub struct RpcChainSource {
    transport: Arc<HttpTransport>,
    config: RpcSourceConfig,
}

impl RpcChainSource {
    pub fn new(config: RpcSourceConfig) -> Result<Self, WatchError> {
        let transport = HttpTransport::new(config.http_url.clone(), config.http.clone())?;
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Deployed bytecode at `address`; empty for an externally owned account.
    pub async fn get_code(&self, address: &str) -> Result<Vec<u8>, WatchError> {
        let code = self
            .transport
            .call("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        Ok(parse_bytes(&code)?)
    }
}

async fn block_number(transport: &HttpTransport) -> Result<u64, TransportError> {
    parse_quantity(&transport.call("eth_blockNumber", vec![]).await?)
}

async fn logs(
    transport: &HttpTransport,
    from: u64,
    to: u64,
    address: &str,
) -> Result<Vec<RawLog>, TransportError> {
    let filter = json!({
        "fromBlock": quantity(from),
        "toBlock": quantity(to),
        "address": address,
    });
    parse_logs(transport.call("eth_getLogs", vec![filter]).await?)
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn chain_id(&self) -> Result<u64, WatchError> {
        Ok(parse_quantity(&self.transport.call("eth_chainId", vec![]).await?)?)
    }

    async fn current_height(&self) -> Result<u64, WatchError> {
        Ok(block_number(&self.transport).await?)
    }

    async fn get_logs(&self, from: u64, to: u64, address: &str) -> Result<Vec<RawLog>, WatchError> {
        tracing::debug!(from, to, "eth_getLogs");
        logs(&self.transport, from, to, address)
            .await
            .map_err(|e| e.into_logs_error(from, to))
    }

    async fn subscribe(&self, address: &str, from_block: Option<u64>) -> Result<LogStream, WatchError> {
        match &self.config.ws_url {
            Some(ws_url) => Ok(subscribe_logs(ws_url.clone(), address.to_string(), self.config.ws.clone())),
            None => {
                let next_block = block_number(&self.transport).await? + 1;
                let start = from_block.map_or(next_block, |from| from.min(next_block));
                tracing::info!(
                    rpc = self.transport.url(),
                    from = start,
                    interval_ms = self.config.poll_interval.as_millis() as u64,
                    chunk_size = self.config.chunk_size,
                    "Polling for live logs over HTTP"
                );
                let poller = LogPoller {
                    transport: self.transport.clone(),
                    address: address.to_string(),
                    next: start,
                    chunk_size: self.config.chunk_size.max(1),
                };
                Ok(poller.spawn(self.config.poll_interval, self.config.ws.max_reconnects))
            }
        }
    }

    async fn read_state(&self, address: &str, calldata: Vec<u8>) -> Result<Vec<u8>, WatchError> {
        let call = json!({ "to": address, "data": format!("0x{}", hex::encode(calldata)) });
        let result: Value = self.transport.call("eth_call", vec![call, json!("latest")]).await?;
        Ok(parse_bytes(&result)?)
    }
}

/// Live log stream built from periodic `eth_getLogs` calls.
struct LogPoller {
    transport: Arc<HttpTransport>,
    address: String,
    next: u64,
    /// Shrinks when the node rejects a range, like the catch-up window.
    chunk_size: u64,
}

impl LogPoller {
    fn spawn(mut self, interval: Duration, max_failures: u32) -> LogStream {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    return;
                }
                match self.poll().await {
                    Ok(batch) => {
                        failures = 0;
                        for log in batch {
                            if tx.unbounded_send(Ok(log)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if failures < max_failures => {
                        failures += 1;
                        tracing::warn!(error = %e, failures, "Live log poll failed");
                    }
                    Err(e) => {
                        let _ = tx.unbounded_send(Err(WatchError::SubscriptionClosed(e.to_string())));
                        return;
                    }
                }
            }
        });
        rx.boxed()
    }

    /// Fetch at most one chunk of new logs and move past it.
    async fn poll(&mut self) -> Result<Vec<RawLog>, TransportError> {
        let head = block_number(&self.transport).await?;
        if head < self.next {
            return Ok(vec![]);
        }
        loop {
            let to = head.min(self.next.saturating_add(self.chunk_size - 1));
            match logs(&self.transport, self.next, to, &self.address).await {
                Ok(batch) => {
                    self.next = to + 1;
                    return Ok(batch);
                }
                Err(e) if e.is_range_too_large() && self.chunk_size > 1 => {
                    self.chunk_size /= 2;
                    tracing::warn!(
                        from = self.next,
                        to,
                        chunk_size = self.chunk_size,
                        error = %e,
                        "Provider rejected live poll range, reducing chunk size"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
