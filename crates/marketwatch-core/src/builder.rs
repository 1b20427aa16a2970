//! Fluent builder for `WatcherConfig`.
//!
//! # Example
//!
//! ```rust
//! use marketwatch_core::builder::WatcherBuilder;
//! use marketwatch_core::config::ActivationBlocks;
//!
//! let config = WatcherBuilder::new()
//!     .contract("0x2b3F2887c697B3f4f8D9F818c95482e1a3A759A5")
//!     .chunk_size(500)
//!     .activation_blocks(ActivationBlocks::known())
//!     .build()
//!     .unwrap();
//! assert_eq!(config.chunk_size, 500);
//! ```

use std::time::Duration;

use crate::config::{ActivationBlocks, WatcherConfig};
use crate::error::WatchError;

#[derive(Default)]
pub struct WatcherBuilder {
    config: WatcherConfig,
}

impl WatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
        }
    }

    /// Set the watched contract address.
    pub fn contract(mut self, address: impl Into<String>) -> Self {
        self.config.contract_address = address.into();
        self
    }

    /// Set the largest block range per log query.
    pub fn chunk_size(mut self, blocks: u64) -> Self {
        self.config.chunk_size = blocks;
        self
    }

    /// Set the floor for range reduction.
    pub fn min_chunk_size(mut self, blocks: u64) -> Self {
        self.config.min_chunk_size = blocks;
        self
    }

    pub fn activation_blocks(mut self, blocks: ActivationBlocks) -> Self {
        self.config.activation_blocks = blocks;
        self
    }

    pub fn fallback_interval(mut self, interval: Duration) -> Self {
        self.config.fallback_interval = interval;
        self
    }

    /// Re-deliver the last `blocks` blocks every `interval` (zero disables).
    pub fn redundant_playback(mut self, blocks: u64, interval: Duration) -> Self {
        self.config.redundant_playback_blocks = blocks;
        self.config.redundant_playback_interval = interval;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<WatcherConfig, WatchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
