//! WebSocket `eth_subscribe("logs")` subscription with reconnect.
//!
//! A background task owns the connection. When it drops, the task reconnects
//! with exponential backoff and subscribes again; logs emitted while
//! disconnected are picked up by the engine's fallback catch-up. After
//! `max_reconnects` consecutive failures the stream yields an error and ends.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use marketwatch_core::error::WatchError;
use marketwatch_core::source::LogStream;
use marketwatch_core::types::RawLog;

use crate::log::RpcLog;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, TransportError};

type LogSender = futures::channel::mpsc::UnboundedSender<Result<RawLog, WatchError>>;

const SUBSCRIBE_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
    /// Consecutive failed connections before giving up.
    pub max_reconnects: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            max_reconnects: 10,
        }
    }
}

struct Backoff {
    config: WsConfig,
    delay: Duration,
    failures: u32,
}

impl Backoff {
    fn new(config: WsConfig) -> Self {
        Self {
            delay: config.reconnect_initial,
            failures: 0,
            config,
        }
    }

    fn reset(&mut self) {
        self.delay = self.config.reconnect_initial;
        self.failures = 0;
    }

    /// Next wait, or `None` once the failure budget is spent.
    fn next(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.config.max_reconnects {
            return None;
        }
        let delay = self.delay;
        self.delay = (self.delay * 2).min(self.config.reconnect_max);
        Some(delay)
    }
}

/// Open a live log stream for `address` over the WebSocket endpoint `url`.
pub fn subscribe_logs(url: String, address: String, config: WsConfig) -> LogStream {
    let (tx, rx) = futures::channel::mpsc::unbounded();
    tokio::spawn(async move {
        let mut backoff = Backoff::new(config);
        loop {
            let err = match run_connection(&url, &address, &tx, &mut backoff).await {
                Ok(()) => return,
                Err(e) => e,
            };
            match backoff.next() {
                Some(delay) => {
                    tracing::warn!(url = %url, error = %err, delay_ms = delay.as_millis() as u64, "Log subscription dropped, reconnecting");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(url = %url, error = %err, "Log subscription lost, giving up");
                    let _ = tx.unbounded_send(Err(WatchError::SubscriptionClosed(err.to_string())));
                    return;
                }
            }
        }
    });
    rx.boxed()
}

/// Run one connection. `Ok(())` means the consumer went away.
async fn run_connection(
    url: &str,
    address: &str,
    tx: &LogSender,
    backoff: &mut Backoff,
) -> Result<(), TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    let req = JsonRpcRequest::new(
        SUBSCRIBE_ID,
        "eth_subscribe",
        vec![json!("logs"), json!({ "address": address })],
    );
    let payload = serde_json::to_string(&req).map_err(|e| TransportError::Malformed(e.to_string()))?;
    sink.send(Message::Text(payload.into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;

    let mut subscription: Option<String> = None;
    while let Some(msg) = stream.next().await {
        if tx.is_closed() {
            return Ok(());
        }
        let text = match msg.map_err(|e| TransportError::WebSocket(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let value: Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable WebSocket message");
                continue;
            }
        };

        if subscription.is_none() && value.get("id") == Some(&json!(SUBSCRIBE_ID)) {
            let resp: JsonRpcResponse =
                serde_json::from_value(value).map_err(|e| TransportError::Malformed(e.to_string()))?;
            let id = resp.into_result().map_err(TransportError::Rpc)?;
            let id = id
                .as_str()
                .ok_or_else(|| TransportError::Malformed(format!("subscription id {id}")))?;
            tracing::info!(url, subscription = id, "Subscribed to contract logs");
            subscription = Some(id.to_string());
            backoff.reset();
            continue;
        }

        if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            continue;
        }
        let params = &value["params"];
        if params["subscription"].as_str() != subscription.as_deref() {
            continue;
        }
        let log = RpcLog::from_value(params["result"].clone())?.into_raw()?;
        if tx.unbounded_send(Ok(log)).is_err() {
            return Ok(());
        }
    }
    Err(TransportError::WebSocket("connection closed".into()))
}
