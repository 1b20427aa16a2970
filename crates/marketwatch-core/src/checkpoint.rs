//! Checkpoint store: persists the highest fully delivered block.
//!
//! On restart the engine resumes from the stored block rather than replaying
//! the whole chain. A missing checkpoint means "start from zero" and is not an
//! error. Writes are best-effort: a failed write only costs a longer catch-up
//! on the next start, because replayed events are upserted idempotently by the
//! reporting sink.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::dispatcher::UnitDelivered;
use crate::error::WatchError;

/// File name used inside the configured checkpoint directory.
pub const CHECKPOINT_FILE: &str = "lastBlock";

/// Trait for reading and writing the single checkpoint slot.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the stored block number, `None` if nothing was ever written.
    async fn read(&self) -> Result<Option<u64>, WatchError>;

    /// Persist `block_number`.
    async fn write(&self, block_number: u64) -> Result<(), WatchError>;
}

/// Owns the in-process checkpoint value and guarantees it never decreases.
///
/// The only way to move it forward is [`CheckpointManager::advance`], which
/// requires a [`UnitDelivered`] receipt from the dispatcher.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    current: u64,
    loaded: bool,
}

impl CheckpointManager {
    pub fn new(store: Box<dyn CheckpointStore>) -> Self {
        Self {
            store,
            current: 0,
            loaded: false,
        }
    }

    /// Read the persisted checkpoint once; later calls return the in-memory value.
    pub async fn load(&mut self) -> Result<u64, WatchError> {
        if !self.loaded {
            match self.store.read().await? {
                Some(block) => {
                    tracing::info!(block, "Loaded checkpoint");
                    self.current = self.current.max(block);
                }
                None => tracing::info!("No checkpoint found, starting from block zero"),
            }
            self.loaded = true;
        }
        Ok(self.current)
    }

    /// Highest block known to be fully delivered.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Advance past a delivered unit. Returns `false` if the receipt would not
    /// move the checkpoint forward.
    pub async fn advance(&mut self, receipt: UnitDelivered) -> bool {
        let through = receipt.through_block();
        if through <= self.current {
            tracing::debug!(through, current = self.current, "Checkpoint already past unit");
            return false;
        }
        self.current = through;
        if let Err(e) = self.store.write(through).await {
            tracing::error!(block = through, error = %e, "Failed to persist checkpoint");
        }
        true
    }
}

// ─── File store ───────────────────────────────────────────────────────────────

/// Stores the checkpoint as ASCII decimal in `<dir>/lastBlock`.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CHECKPOINT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self) -> Result<Option<u64>, WatchError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WatchError::Checkpoint(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };
        contents.trim().parse::<u64>().map(Some).map_err(|e| {
            WatchError::Checkpoint(format!(
                "{} holds '{}', not a block number: {e}",
                self.path.display(),
                contents.trim()
            ))
        })
    }

    async fn write(&self, block_number: u64) -> Result<(), WatchError> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, block_number.to_string())
            .await
            .map_err(|e| WatchError::Checkpoint(format!("writing {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| WatchError::Checkpoint(format!("renaming to {}: {e}", self.path.display())))?;
        tracing::info!(block = block_number, path = %self.path.display(), "Wrote checkpoint");
        Ok(())
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and dry runs. Remembers every write.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    writes: Mutex<Vec<u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `block`.
    pub fn starting_at(block: u64) -> Self {
        Self {
            writes: Mutex::new(vec![block]),
        }
    }

    /// Every value written so far, oldest first.
    pub fn writes(&self) -> Vec<u64> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn read(&self) -> Result<Option<u64>, WatchError> {
        let writes = self
            .writes
            .lock()
            .map_err(|_| WatchError::Checkpoint("memory store poisoned".into()))?;
        Ok(writes.last().copied())
    }

    async fn write(&self, block_number: u64) -> Result<(), WatchError> {
        self.writes
            .lock()
            .map_err(|_| WatchError::Checkpoint("memory store poisoned".into()))?
            .push(block_number);
        Ok(())
    }
}

/// Lets tests keep a handle on a store after handing it to the engine.
#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<T> {
    async fn read(&self) -> Result<Option<u64>, WatchError> {
        (**self).read().await
    }

    async fn write(&self, block_number: u64) -> Result<(), WatchError> {
        (**self).write(block_number).await
    }
}
