//! MarketWatch CLI: the marketplace contract watcher.
//!
//! # Commands
//! ```bash
//! marketwatch run         # catch up, then watch live (settings from flags or env)
//! marketwatch checkpoint  --last-block-dir <dir>
//! marketwatch info
//! ```
//!
//! `run` only returns on shutdown (Ctrl-C / SIGTERM, exit code 0) or on a
//! fatal error (non-zero exit). Recovery is a restart: the next run resumes
//! from the stored checkpoint.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use marketwatch_core::checkpoint::{CheckpointStore, FileCheckpointStore};
use marketwatch_core::config::WatcherConfig;
use marketwatch_core::dispatcher::Dispatcher;
use marketwatch_core::engine::PlaybackEngine;
use marketwatch_core::source::ChainSource;
use marketwatch_evm::{MarketplaceDecoder, MarketplaceEvent, RpcChainSource};
use marketwatch_sink::{CoreApiClient, ReportingSink, DEFAULT_REQUEST_TIMEOUT};

mod config;
mod logging;

use config::{Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(&cli.log.log_config());

    match cli.command {
        Commands::Run(args) => cmd_run(*args).await,
        Commands::Checkpoint { last_block_dir } => cmd_checkpoint(&last_block_dir).await,
        Commands::Info => cmd_info(),
    }
}

// ─── run ──────────────────────────────────────────────────────────────────────

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = args.watcher_config().context("invalid watcher configuration")?;

    let source = Arc::new(RpcChainSource::new(args.source_config()).context("building chain source")?);
    check_contract(&source, &config.contract_address, args.network_id).await?;

    let client = CoreApiClient::new(
        &args.streamr_api_url,
        &args.streamr_api_token,
        DEFAULT_REQUEST_TIMEOUT,
    )
    .context("building core API client")?;
    let sink = ReportingSink::new(client);
    tracing::info!(api = sink.client().base_url(), "Reporting to core API");
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(sink));

    tokio::fs::create_dir_all(&args.last_block_dir)
        .await
        .with_context(|| format!("creating checkpoint directory {}", args.last_block_dir.display()))?;
    let store = FileCheckpointStore::new(&args.last_block_dir);
    tracing::info!(path = %store.path().display(), "Using checkpoint file");

    let decoder = MarketplaceDecoder::new(source.clone(), &config.contract_address);
    tracing::info!(
        contract = %config.contract_address,
        rpc = %args.ethereum_server_url,
        live = if args.ethereum_ws_url.is_some() { "websocket" } else { "http-poll" },
        chunk_size = config.chunk_size,
        handlers = dispatcher.handler_count(),
        "Starting marketplace watcher"
    );
    let engine = PlaybackEngine::new(config, source, Arc::new(decoder), dispatcher, Box::new(store))
        .context("building playback engine")?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing the current window");
        cancel.cancel();
    });

    engine.run().await.context("watcher stopped on a fatal error")?;
    tracing::info!(checkpoint = engine.checkpoint().await, "Watcher stopped");
    Ok(())
}

/// Refuse to start against an address without code or the wrong network.
async fn check_contract(source: &RpcChainSource, address: &str, network_id: Option<u64>) -> Result<()> {
    let chain_id = source.chain_id().await.context("querying chain id")?;
    if let Some(expected) = network_id {
        if chain_id != expected {
            bail!("node reports chain id {chain_id}, expected NETWORK_ID {expected}");
        }
    }
    let code = source
        .get_code(address)
        .await
        .with_context(|| format!("querying code at {address}"))?;
    if code.is_empty() {
        bail!("{address} has no contract code on chain {chain_id}");
    }
    tracing::info!(chain_id, contract = address, code_bytes = code.len(), "Marketplace contract found");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ─── checkpoint ───────────────────────────────────────────────────────────────

async fn cmd_checkpoint(dir: &Path) -> Result<()> {
    let store = FileCheckpointStore::new(dir);
    match store.read().await? {
        Some(block) => println!("{block}"),
        None => println!("no checkpoint at {} (a run starts from block 0)", store.path().display()),
    }
    Ok(())
}

// ─── info ─────────────────────────────────────────────────────────────────────

fn cmd_info() -> Result<()> {
    println!("MarketWatch v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Default watcher configuration:");
    println!("{}", serde_json::to_string_pretty(&WatcherConfig::default())?);
    println!();
    println!("Marketplace events:");
    for event in MarketplaceEvent::ALL {
        let action = if event.is_mapped() { "reported" } else { "ignored " };
        println!("  {action}  {}  {}", event.topic(), event.signature());
    }
    Ok(())
}
