//! Chain source and decoder collaborator traits.
//!
//! The engine never talks to a node directly. It is handed a [`ChainSource`]
//! (block height, log ranges, live logs, one state read) and an
//! [`EventDecoder`] at construction time.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::WatchError;
use crate::types::{DomainEvent, RawLog};

/// Live log stream returned by [`ChainSource::subscribe`].
pub type LogStream = BoxStream<'static, Result<RawLog, WatchError>>;

/// Everything the engine needs from the chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Numeric chain id of the connected network.
    async fn chain_id(&self) -> Result<u64, WatchError>;

    /// Current head block number.
    async fn current_height(&self) -> Result<u64, WatchError>;

    /// Logs emitted by `address` in `[from, to]`, in chain order.
    async fn get_logs(&self, from: u64, to: u64, address: &str) -> Result<Vec<RawLog>, WatchError>;

    /// Open a live subscription for logs emitted by `address`.
    ///
    /// A source that can backfill starts at `from_block` (never past the
    /// head). Push-only sources and `None` start at the head.
    async fn subscribe(&self, address: &str, from_block: Option<u64>) -> Result<LogStream, WatchError>;

    /// Read-only contract call against the latest state.
    async fn read_state(&self, address: &str, calldata: Vec<u8>) -> Result<Vec<u8>, WatchError>;
}

#[async_trait]
impl<T: ChainSource + ?Sized> ChainSource for Arc<T> {
    async fn chain_id(&self) -> Result<u64, WatchError> {
        (**self).chain_id().await
    }

    async fn current_height(&self) -> Result<u64, WatchError> {
        (**self).current_height().await
    }

    async fn get_logs(&self, from: u64, to: u64, address: &str) -> Result<Vec<RawLog>, WatchError> {
        (**self).get_logs(from, to, address).await
    }

    async fn subscribe(&self, address: &str, from_block: Option<u64>) -> Result<LogStream, WatchError> {
        (**self).subscribe(address, from_block).await
    }

    async fn read_state(&self, address: &str, calldata: Vec<u8>) -> Result<Vec<u8>, WatchError> {
        (**self).read_state(address, calldata).await
    }
}

/// Turns one raw log into exactly one domain event.
///
/// Unknown signatures decode to [`crate::types::EventKind::Ignored`]; an `Err`
/// means the log is malformed or a required state read failed.
#[async_trait]
pub trait EventDecoder: Send + Sync {
    async fn decode(&self, log: &RawLog) -> Result<DomainEvent, WatchError>;
}

// ─── In-memory source (for testing) ───────────────────────────────────────────

type LiveSender = futures::channel::mpsc::UnboundedSender<Result<RawLog, WatchError>>;

#[derive(Default)]
struct MemoryChain {
    height: u64,
    logs: Vec<RawLog>,
    max_range: Option<u64>,
    call_results: HashMap<Vec<u8>, Vec<u8>>,
    queries: Vec<(u64, u64)>,
    subscriptions: Vec<Option<u64>>,
    subscribers: Vec<LiveSender>,
}

/// Scriptable chain source for tests and dry runs.
pub struct MemoryChainSource {
    chain_id: u64,
    chain: Mutex<MemoryChain>,
}

impl MemoryChainSource {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            chain: Mutex::new(MemoryChain::default()),
        }
    }

    fn chain(&self) -> MutexGuard<'_, MemoryChain> {
        self.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_height(&self, height: u64) {
        self.chain().height = height;
    }

    /// Add a historical log; the head moves up to its block if needed.
    pub fn push_log(&self, log: RawLog) {
        let mut chain = self.chain();
        chain.height = chain.height.max(log.block_number);
        chain.logs.push(log);
    }

    /// Reject `get_logs` calls spanning more than `blocks` blocks.
    pub fn set_max_range(&self, blocks: u64) {
        self.chain().max_range = Some(blocks);
    }

    /// Answer `read_state(calldata)` with `result`. Unknown calls revert.
    pub fn set_call_result(&self, calldata: Vec<u8>, result: Vec<u8>) {
        self.chain().call_results.insert(calldata, result);
    }

    /// Every `[from, to]` range requested so far, including rejected ones.
    pub fn queries(&self) -> Vec<(u64, u64)> {
        self.chain().queries.clone()
    }

    /// The `from_block` of every `subscribe` call so far.
    pub fn subscriptions(&self) -> Vec<Option<u64>> {
        self.chain().subscriptions.clone()
    }

    /// Deliver a log to every live subscriber.
    pub fn push_live(&self, log: RawLog) {
        self.chain()
            .subscribers
            .retain(|tx| tx.unbounded_send(Ok(log.clone())).is_ok());
    }

    /// End every live subscription.
    pub fn close_live(&self) {
        self.chain().subscribers.clear();
    }
}

#[async_trait]
impl ChainSource for MemoryChainSource {
    async fn chain_id(&self) -> Result<u64, WatchError> {
        Ok(self.chain_id)
    }

    async fn current_height(&self) -> Result<u64, WatchError> {
        Ok(self.chain().height)
    }

    async fn get_logs(&self, from: u64, to: u64, address: &str) -> Result<Vec<RawLog>, WatchError> {
        let mut chain = self.chain();
        chain.queries.push((from, to));
        if let Some(max) = chain.max_range {
            if to.saturating_sub(from) + 1 > max {
                return Err(WatchError::RangeTooLarge {
                    from,
                    to,
                    reason: format!("range exceeds {max} blocks"),
                });
            }
        }
        let mut logs: Vec<RawLog> = chain
            .logs
            .iter()
            .filter(|l| l.block_number >= from && l.block_number <= to)
            .filter(|l| l.address.eq_ignore_ascii_case(address))
            .cloned()
            .collect();
        logs.sort_by_key(RawLog::position);
        Ok(logs)
    }

    async fn subscribe(&self, _address: &str, from_block: Option<u64>) -> Result<LogStream, WatchError> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut chain = self.chain();
        chain.subscriptions.push(from_block);
        chain.subscribers.push(tx);
        Ok(rx.boxed())
    }

    async fn read_state(&self, _address: &str, calldata: Vec<u8>) -> Result<Vec<u8>, WatchError> {
        self.chain()
            .call_results
            .get(&calldata)
            .cloned()
            .ok_or_else(|| WatchError::Rpc("execution reverted".into()))
    }
}
