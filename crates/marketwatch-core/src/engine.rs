//! The playback engine: reconciles the checkpoint with the chain head, then
//! follows the live log subscription.
//!
//! # Catch-up
//! Scan `[checkpoint + 1, head]` in windows of at most `chunk_size` blocks.
//! For each window: fetch logs → decode in chain order → dispatch as one unit
//! → advance the checkpoint to the window end. When the range is exhausted the
//! head is re-read and the scan continues while it moved.
//!
//! # Live
//! Each new log is decoded and dispatched on its own. Live events do not move
//! the checkpoint; the fallback catch-up timer covers their blocks later. The
//! subscription asks to start right after the checkpoint, which a polling
//! source honours and a push source cannot.
//!
//! # Serialization
//! Every path that fetches, dispatches or persists (catch-up, fallback timer,
//! redundant playback, live events) runs under one async mutex, the one that
//! owns the [`CheckpointManager`]. The timers and the live loop are joined in a
//! single task, so the lock is the only thing ordering them.

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::{WatcherConfig, WatcherState};
use crate::dispatcher::Dispatcher;
use crate::error::WatchError;
use crate::source::{ChainSource, EventDecoder};
use crate::types::{DomainEvent, EventKind, RawLog};
use crate::window::{PlaybackWindow, WindowCursor};

/// Summary of one catch-up run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    /// First block scanned, `None` if already caught up.
    pub from: Option<u64>,
    /// Last block delivered.
    pub to: Option<u64>,
    pub windows: usize,
    /// Decoded events across all windows, ignored ones included.
    pub events: usize,
    /// Checkpoint after the run.
    pub checkpoint: u64,
    /// `true` if cancellation stopped the scan before the head.
    pub interrupted: bool,
}

/// Drives catch-up, live watching and the periodic re-plays.
pub struct PlaybackEngine {
    config: WatcherConfig,
    source: Arc<dyn ChainSource>,
    decoder: Arc<dyn EventDecoder>,
    dispatcher: Dispatcher,
    checkpoint: tokio::sync::Mutex<CheckpointManager>,
    state: Mutex<WatcherState>,
    chunk_size: AtomicU64,
    cancel: CancellationToken,
}

impl PlaybackEngine {
    /// Fails with [`WatchError::Config`] if `config` does not validate.
    pub fn new(
        config: WatcherConfig,
        source: Arc<dyn ChainSource>,
        decoder: Arc<dyn EventDecoder>,
        dispatcher: Dispatcher,
        store: Box<dyn CheckpointStore>,
    ) -> Result<Self, WatchError> {
        config.validate()?;
        Ok(Self {
            chunk_size: AtomicU64::new(config.chunk_size),
            config,
            source,
            decoder,
            dispatcher,
            checkpoint: tokio::sync::Mutex::new(CheckpointManager::new(store)),
            state: Mutex::new(WatcherState::Idle),
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token (e.g. a child of the
    /// process-wide shutdown token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current window size; smaller than configured after a range rejection.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.load(Ordering::Relaxed)
    }

    /// Highest fully delivered block. Waits for any in-flight window.
    pub async fn checkpoint(&self) -> u64 {
        self.checkpoint.lock().await.current()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop. The in-flight window or live event still completes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, next: WatcherState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "Engine state change");
            *state = next;
        }
    }

    // ─── Catch-up ─────────────────────────────────────────────────────────────

    /// Deliver everything between the checkpoint and the chain head.
    ///
    /// Safe to call while live: it only moves the state out of `Idle`.
    pub async fn catch_up(&self) -> Result<CatchUpReport, WatchError> {
        let mut checkpoint = self.checkpoint.lock().await;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                WatcherState::Stopped => return Err(WatchError::Stopped),
                WatcherState::Idle => *state = WatcherState::CatchingUp,
                _ => {}
            }
        }
        let result = self.catch_up_locked(&mut checkpoint).await;
        if result.is_err() {
            self.set_state(WatcherState::Stopped);
        }
        result
    }

    async fn catch_up_locked(
        &self,
        checkpoint: &mut CheckpointManager,
    ) -> Result<CatchUpReport, WatchError> {
        let stored = checkpoint.load().await?;
        let mut report = CatchUpReport {
            checkpoint: stored,
            ..Default::default()
        };

        let mut head = self.source.current_height().await?;
        if stored >= head {
            tracing::debug!(checkpoint = stored, head, "Already caught up");
            return Ok(report);
        }

        let start = self.scan_start(stored + 1).await?;
        tracing::info!(from = start, to = head, chunk_size = self.chunk_size(), "Starting catch-up");
        report.from = Some(start);

        let mut cursor = WindowCursor::new(start, head, self.chunk_size());
        loop {
            if cursor.peek().is_none() {
                let latest = self.source.current_height().await?;
                if latest <= head {
                    break;
                }
                tracing::info!(from = head + 1, to = latest, "Chain advanced during catch-up");
                head = latest;
                cursor.extend_to(latest);
                continue;
            }
            if self.cancel.is_cancelled() {
                tracing::info!(checkpoint = checkpoint.current(), "Catch-up interrupted by shutdown");
                report.interrupted = true;
                break;
            }
            let Some((window, events)) = self.next_window(&mut cursor).await? else {
                continue;
            };

            let receipt = self
                .dispatcher
                .dispatch_unit(window.to, &events, WatchError::is_transient_downstream)
                .await?;
            checkpoint.advance(receipt).await;
            tracing::info!(
                from = window.from,
                to = window.to,
                blocks = window.block_count(),
                events = events.len(),
                delivered = receipt.delivered(),
                skipped = receipt.skipped(),
                "Window delivered"
            );

            cursor.complete(window);
            report.windows += 1;
            report.events += events.len();
            report.to = Some(window.to);
        }

        report.checkpoint = checkpoint.current();
        if !report.interrupted {
            tracing::info!(
                checkpoint = report.checkpoint,
                windows = report.windows,
                events = report.events,
                "Catch-up complete"
            );
        }
        Ok(report)
    }

    /// Apply the activation-block shortcut for the connected network, if any.
    async fn scan_start(&self, start: u64) -> Result<u64, WatchError> {
        if self.config.activation_blocks.is_empty() {
            return Ok(start);
        }
        let chain_id = self.source.chain_id().await?;
        match self.config.activation_blocks.for_chain(chain_id) {
            Some(activation) if start < activation => {
                tracing::info!(chain_id, from = start, to = activation, "Skipping to activation block");
                Ok(activation)
            }
            _ => Ok(start),
        }
    }

    /// Fetch and decode the cursor's next window, shrinking the window while
    /// the provider rejects it as too large.
    async fn next_window(
        &self,
        cursor: &mut WindowCursor,
    ) -> Result<Option<(PlaybackWindow, Vec<DomainEvent>)>, WatchError> {
        loop {
            let Some(window) = cursor.peek() else {
                return Ok(None);
            };
            match self
                .source
                .get_logs(window.from, window.to, &self.config.contract_address)
                .await
            {
                Ok(logs) => {
                    let events = self.decode_all(logs).await.map_err(|e| {
                        tracing::error!(from = window.from, to = window.to, error = %e, "Window failed to decode");
                        e
                    })?;
                    return Ok(Some((window, events)));
                }
                Err(e) if e.is_range_too_large() && cursor.shrink(self.config.min_chunk_size) => {
                    self.chunk_size.store(cursor.size(), Ordering::Relaxed);
                    tracing::warn!(
                        from = window.from,
                        to = window.to,
                        chunk_size = cursor.size(),
                        error = %e,
                        "Provider rejected range, reducing chunk size"
                    );
                }
                Err(e) => {
                    tracing::error!(from = window.from, to = window.to, error = %e, "Log query failed");
                    return Err(e);
                }
            }
        }
    }

    /// Decode a window's logs in (block, tx index, log index) order.
    async fn decode_all(&self, mut logs: Vec<RawLog>) -> Result<Vec<DomainEvent>, WatchError> {
        logs.sort_by_key(RawLog::position);
        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                warn_removed(log);
                continue;
            }
            let event = self.decoder.decode(log).await?;
            log_decoded(&event);
            events.push(event);
        }
        Ok(events)
    }

    // ─── Redundant playback ───────────────────────────────────────────────────

    /// Re-deliver `[head - blocks, head]` without touching the checkpoint.
    /// Returns the number of decoded events.
    pub async fn replay_recent(&self, blocks: u64) -> Result<usize, WatchError> {
        let _serial = self.checkpoint.lock().await;
        let head = self.source.current_height().await?;
        self.replay_locked(head.saturating_sub(blocks), head).await
    }

    /// Re-deliver `[from, to]` without touching the checkpoint.
    pub async fn replay_range(&self, from: u64, to: u64) -> Result<usize, WatchError> {
        let _serial = self.checkpoint.lock().await;
        self.replay_locked(from, to).await
    }

    async fn replay_locked(&self, from: u64, to: u64) -> Result<usize, WatchError> {
        tracing::info!(from, to, "Replaying recent blocks");
        let mut cursor = WindowCursor::new(from, to, self.chunk_size());
        let mut total = 0;
        while !self.cancel.is_cancelled() {
            let Some((window, events)) = self.next_window(&mut cursor).await? else {
                break;
            };
            self.dispatcher
                .dispatch_unit(window.to, &events, WatchError::is_transient_downstream)
                .await?;
            total += events.len();
            cursor.complete(window);
        }
        Ok(total)
    }

    // ─── Live ─────────────────────────────────────────────────────────────────

    /// Follow the live subscription until shutdown or a fatal error.
    ///
    /// Returns [`WatchError::AlreadyLive`] if live watching is already running.
    pub async fn run_live(&self) -> Result<(), WatchError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                WatcherState::Live => return Err(WatchError::AlreadyLive),
                WatcherState::Stopped => return Err(WatchError::Stopped),
                _ => *state = WatcherState::Live,
            }
        }
        let result = self.follow_subscription().await;
        self.set_state(WatcherState::Stopped);
        result
    }

    async fn follow_subscription(&self) -> Result<(), WatchError> {
        let address = &self.config.contract_address;
        let delivered = self.checkpoint.lock().await.current();
        let from_block = (delivered > 0).then(|| delivered + 1);
        let mut stream = self.source.subscribe(address, from_block).await?;
        tracing::info!(contract = %address, from = ?from_block, "Watching live logs");

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Live watching stopped");
                    return Ok(());
                }
                next = stream.next() => next,
            };
            match next {
                Some(Ok(log)) => self.play_live(log).await?,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Live subscription failed");
                    return Err(e);
                }
                None => return Err(WatchError::SubscriptionClosed("stream ended".into())),
            }
        }
    }

    async fn play_live(&self, log: RawLog) -> Result<(), WatchError> {
        if log.removed {
            warn_removed(&log);
            return Ok(());
        }
        let _serial = self.checkpoint.lock().await;
        let event = self.decoder.decode(&log).await?;
        log_decoded(&event);
        self.dispatcher
            .dispatch_unit(log.block_number, std::slice::from_ref(&event), WatchError::is_transient_downstream)
            .await?;
        Ok(())
    }

    // ─── Full lifecycle ───────────────────────────────────────────────────────

    /// Catch up, then watch live alongside the fallback and redundant timers.
    ///
    /// Returns `Ok(())` after a shutdown request and the first fatal error
    /// otherwise; the caller is expected to exit and restart from the checkpoint.
    pub async fn run(&self) -> Result<(), WatchError> {
        self.catch_up().await?;
        if self.cancel.is_cancelled() {
            self.set_state(WatcherState::Stopped);
            return Ok(());
        }

        let result = tokio::try_join!(self.run_live(), self.fallback_loop(), self.redundant_loop());
        self.set_state(WatcherState::Stopped);
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Engine stopped on fatal error");
                Err(e)
            }
        }
    }

    async fn fallback_loop(&self) -> Result<(), WatchError> {
        let period = self.config.fallback_interval;
        let mut ticker = ticker(period);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            tracing::info!(interval_ms = period.as_millis() as u64, "Running fallback catch-up");
            self.catch_up().await?;
        }
    }

    async fn redundant_loop(&self) -> Result<(), WatchError> {
        let period = self.config.redundant_playback_interval;
        let blocks = self.config.redundant_playback_blocks;
        if period.is_zero() || blocks == 0 {
            return Ok(());
        }
        let mut ticker = ticker(period);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            let events = self.replay_recent(blocks).await?;
            tracing::info!(blocks, events, "Redundant playback complete");
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn warn_removed(log: &RawLog) {
    tracing::warn!(
        block = log.block_number,
        log_index = log.log_index,
        tx = %log.transaction_hash,
        "Log removed by chain reorganization, not compensating"
    );
}

fn log_decoded(event: &DomainEvent) {
    match &event.kind {
        EventKind::Ignored { signature } => tracing::debug!(
            block = event.block_number(),
            index = event.block_index(),
            signature = %signature,
            "Ignored event"
        ),
        kind => tracing::info!(
            block = event.block_number(),
            index = event.block_index(),
            event = kind.name(),
            product = kind.product_id().map(|p| p.as_str()).unwrap_or_default(),
            "Decoded event"
        ),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
