//! Watcher configuration and state types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::WatchError;

/// Per-network "activation" blocks: catch-up jumps straight to this block if
/// the checkpoint is below it.
///
/// Best effort only. Any relevant event emitted before the activation block is
/// silently missed, so leave this empty when completeness matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationBlocks(BTreeMap<u64, u64>);

impl ActivationBlocks {
    /// No shortcuts; every block from the checkpoint on is scanned.
    pub fn none() -> Self {
        Self::default()
    }

    /// Deployment blocks of the marketplace on the networks it is known on.
    pub fn known() -> Self {
        Self::none()
            .with(1, 14_140_263) // mainnet, 2022-02
            .with(4, 1_920_000) // rinkeby
    }

    pub fn with(mut self, chain_id: u64, block: u64) -> Self {
        self.0.insert(chain_id, block);
        self
    }

    pub fn for_chain(&self, chain_id: u64) -> Option<u64> {
        self.0.get(&chain_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Configuration for a watcher instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Marketplace contract address (`0x…`).
    pub contract_address: String,
    /// Largest block range requested from the chain source in one call.
    pub chunk_size: u64,
    /// Floor for chunk size reduction after a provider range rejection.
    pub min_chunk_size: u64,
    /// Optional per-network scan start shortcuts.
    pub activation_blocks: ActivationBlocks,
    /// Interval of the fallback catch-up while live.
    #[serde(with = "millis")]
    pub fallback_interval: Duration,
    /// How many recent blocks the redundant playback re-delivers.
    pub redundant_playback_blocks: u64,
    /// Interval of the redundant playback; zero disables it.
    #[serde(with = "millis")]
    pub redundant_playback_interval: Duration,
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.contract_address.is_empty() {
            return Err(WatchError::Config("contract address is required".into()));
        }
        if self.min_chunk_size == 0 || self.chunk_size < self.min_chunk_size {
            return Err(WatchError::Config(format!(
                "chunk size {} must be at least the minimum {} (and non-zero)",
                self.chunk_size, self.min_chunk_size
            )));
        }
        if self.fallback_interval.is_zero() {
            return Err(WatchError::Config("fallback interval must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            contract_address: String::new(),
            chunk_size: 1000,
            min_chunk_size: 1,
            activation_blocks: ActivationBlocks::none(),
            fallback_interval: Duration::from_secs(3600),
            redundant_playback_blocks: 50,
            redundant_playback_interval: Duration::from_secs(600),
        }
    }
}

/// Runtime state of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatcherState {
    /// Not yet started.
    Idle,
    /// Replaying history up to the chain head.
    CatchingUp,
    /// Following the live log subscription.
    Live,
    /// Terminated by shutdown or a fatal error.
    Stopped,
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Live => write!(f, "live"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
