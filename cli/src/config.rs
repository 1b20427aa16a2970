//! Command-line and environment configuration.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use marketwatch_core::builder::WatcherBuilder;
use marketwatch_core::config::{ActivationBlocks, WatcherConfig};
use marketwatch_core::error::WatchError;
use marketwatch_evm::RpcSourceConfig;

use crate::logging::LogConfig;

#[derive(Parser, Debug)]
#[command(
    name = "marketwatch",
    about = "Watch marketplace contract events and report them to the core API",
    long_about = "
MarketWatch plays back marketplace contract events since the last stored
block, then follows new ones live, reporting product and subscription
changes to the core API.

Every option can also be set through the environment variable shown next
to it. A .env file in the working directory is loaded first.
",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Catch up from the stored checkpoint, then watch live
    Run(Box<RunArgs>),

    /// Print the stored checkpoint
    Checkpoint {
        /// Directory holding the checkpoint file
        #[arg(long, env = "LAST_BLOCK_DIR", default_value = ".")]
        last_block_dir: PathBuf,
    },

    /// Show defaults and the watched event signatures
    Info,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level or filter directive (RUST_LOG overrides)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,
}

impl LogArgs {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Marketplace contract address
    #[arg(long, env = "MARKETPLACE_ADDRESS")]
    pub marketplace_address: String,

    /// JSON-RPC HTTP endpoint
    #[arg(long, env = "ETHEREUM_SERVER_URL")]
    pub ethereum_server_url: String,

    /// JSON-RPC WebSocket endpoint for live logs; HTTP polling when unset
    #[arg(long, env = "ETHEREUM_WS_URL")]
    pub ethereum_ws_url: Option<String>,

    /// Expected chain id, checked against the node at startup
    #[arg(long, env = "NETWORK_ID")]
    pub network_id: Option<u64>,

    /// Core API base URL
    #[arg(long, env = "STREAMR_API_URL")]
    pub streamr_api_url: String,

    /// Bearer token for the core API
    #[arg(long, env = "STREAMR_API_TOKEN", hide_env_values = true)]
    pub streamr_api_token: String,

    /// Directory holding the checkpoint file
    #[arg(long, env = "LAST_BLOCK_DIR", default_value = ".")]
    pub last_block_dir: PathBuf,

    /// Re-run catch-up this often while live, in milliseconds
    #[arg(long, env = "FALLBACK_CATCH_UP_INTERVAL_MS", default_value_t = 3_600_000)]
    pub fallback_catch_up_interval_ms: u64,

    /// Number of recent blocks re-delivered by redundant playback
    #[arg(long, env = "REDUNDANT_PLAYBACK_BLOCKS", default_value_t = 50)]
    pub redundant_playback_blocks: u64,

    /// Redundant playback period in milliseconds (0 disables)
    #[arg(long, env = "REDUNDANT_PLAYBACK_MS", default_value_t = 600_000)]
    pub redundant_playback_ms: u64,

    /// Largest block range per log query
    #[arg(long, env = "PLAYBACK_CHUNK_SIZE", default_value_t = 1000)]
    pub playback_chunk_size: u64,

    /// Start an empty checkpoint at the marketplace deployment block of known networks
    #[arg(long, env = "USE_ACTIVATION_BLOCKS")]
    pub use_activation_blocks: bool,

    /// Poll interval for live logs over HTTP, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 4_000)]
    pub poll_interval_ms: u64,
}

impl RunArgs {
    pub fn watcher_config(&self) -> Result<WatcherConfig, WatchError> {
        let activation = if self.use_activation_blocks {
            ActivationBlocks::known()
        } else {
            ActivationBlocks::none()
        };
        WatcherBuilder::new()
            .contract(&self.marketplace_address)
            .chunk_size(self.playback_chunk_size)
            .activation_blocks(activation)
            .fallback_interval(Duration::from_millis(self.fallback_catch_up_interval_ms))
            .redundant_playback(
                self.redundant_playback_blocks,
                Duration::from_millis(self.redundant_playback_ms),
            )
            .build()
    }

    pub fn source_config(&self) -> RpcSourceConfig {
        let mut config = RpcSourceConfig::new(&self.ethereum_server_url);
        config.ws_url = self.ethereum_ws_url.clone().filter(|url| !url.is_empty());
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.chunk_size = self.playback_chunk_size;
        config
    }
}
