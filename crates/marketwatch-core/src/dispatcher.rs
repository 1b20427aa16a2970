//! Event handler trait + dispatcher.
//!
//! The dispatcher delivers an ordered unit of events (a playback window, or a
//! single live event) to every registered handler, sequentially. When a whole
//! unit has gone through it hands back a [`UnitDelivered`] receipt; the
//! checkpoint manager only advances on such a receipt.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::WatchError;
use crate::types::DomainEvent;

/// Trait for downstream consumers of domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Process one event. Ignored events are never passed in.
    async fn handle(&self, event: &DomainEvent) -> Result<(), WatchError>;
}

/// Proof that every event of a unit reached every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitDelivered {
    through_block: u64,
    delivered: usize,
    skipped: usize,
}

impl UnitDelivered {
    pub(crate) fn through(through_block: u64) -> Self {
        Self {
            through_block,
            delivered: 0,
            skipped: 0,
        }
    }

    /// Last block covered by the unit.
    pub fn through_block(&self) -> u64 {
        self.through_block
    }

    /// Handler deliveries that succeeded.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Handler deliveries dropped because the sink was unreachable.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Fan-out of domain events to registered handlers.
pub struct Dispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { handlers: vec![] }
    }

    /// Register a handler. Handlers are called in registration order.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `events` in order to every handler.
    ///
    /// `through_block` is the last block the unit covers, which may be past the
    /// last event. A handler error for which `tolerate` returns `true` is
    /// logged and delivery goes on; any other error aborts the unit without a
    /// receipt.
    pub async fn dispatch_unit(
        &self,
        through_block: u64,
        events: &[DomainEvent],
        tolerate: impl Fn(&WatchError) -> bool,
    ) -> Result<UnitDelivered, WatchError> {
        let mut receipt = UnitDelivered::through(through_block);
        for event in events {
            if event.is_ignored() {
                continue;
            }
            for handler in &self.handlers {
                match handler.handle(event).await {
                    Ok(()) => receipt.delivered += 1,
                    Err(e) if tolerate(&e) => {
                        tracing::warn!(
                            handler = handler.name(),
                            block = event.block_number(),
                            event = event.kind.name(),
                            error = %e,
                            "Delivery skipped, continuing with next event"
                        );
                        receipt.skipped += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            handler = handler.name(),
                            block = event.block_number(),
                            event = event.kind.name(),
                            error = %e,
                            "Delivery failed, aborting unit"
                        );
                        return Err(e);
                    }
                }
            }
        }
        Ok(receipt)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
