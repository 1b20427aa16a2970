//! marketwatch-core: playback engine and delivery pipeline for the
//! marketplace contract watcher.
//!
//! # Architecture
//!
//! ```text
//! WatcherBuilder → PlaybackEngine
//!                      ├── ChainSource        (head, log ranges, live logs, state reads)
//!                      ├── EventDecoder       (raw log → DomainEvent)
//!                      ├── Dispatcher         (ordered fan-out, UnitDelivered receipts)
//!                      └── CheckpointManager  (monotonic, file / memory store)
//! ```
//!
//! Chain specifics live in `marketwatch-evm`, the reporting API client in
//! `marketwatch-sink`.

pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod source;
pub mod types;
pub mod window;

pub use builder::WatcherBuilder;
pub use checkpoint::{CheckpointManager, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{ActivationBlocks, WatcherConfig, WatcherState};
pub use dispatcher::{Dispatcher, EventHandler, UnitDelivered};
pub use engine::{CatchUpReport, PlaybackEngine};
pub use error::WatchError;
pub use source::{ChainSource, EventDecoder, LogStream, MemoryChainSource};
pub use types::{Currency, DomainEvent, EventKind, EventPosition, ProductId, ProductTerms, RawLog};
pub use window::{PlaybackWindow, WindowCursor};
