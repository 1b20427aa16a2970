//! Error types for the watcher pipeline.

use thiserror::Error;

/// Errors that can occur while watching, decoding or delivering events.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The provider refused the requested block range as too large.
    #[error("Provider rejected block range {from}..={to}: {reason}")]
    RangeTooLarge { from: u64, to: u64, reason: String },

    #[error("Failed to decode log at block {block_number} (signature {signature}): {reason}")]
    Decode {
        block_number: u64,
        signature: String,
        reason: String,
    },

    #[error("State read for product {product_id} at block {block_number} failed: {reason}")]
    StateRead {
        block_number: u64,
        product_id: String,
        reason: String,
    },

    /// The reporting sink could not be reached. The only tolerated failure class.
    #[error("Reporting sink unavailable in '{handler}': {reason}")]
    SinkUnavailable { handler: String, reason: String },

    #[error("Reporting sink rejected event in '{handler}': {reason}")]
    SinkRejected { handler: String, reason: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Live watching already started")]
    AlreadyLive,

    #[error("Log subscription closed: {0}")]
    SubscriptionClosed(String),

    #[error("Engine stopped after a fatal error")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WatchError {
    /// Returns `true` for the recognised "service unreachable" downstream condition,
    /// which is logged and skipped instead of failing the window.
    pub fn is_transient_downstream(&self) -> bool {
        matches!(self, Self::SinkUnavailable { .. })
    }

    /// Returns `true` if the provider asked for a smaller block range.
    pub fn is_range_too_large(&self) -> bool {
        matches!(self, Self::RangeTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sink_unavailable_is_transient() {
        let transient = WatchError::SinkUnavailable {
            handler: "core-api".into(),
            reason: "connection refused".into(),
        };
        let rejected = WatchError::SinkRejected {
            handler: "core-api".into(),
            reason: "HTTP 400".into(),
        };
        assert!(transient.is_transient_downstream());
        assert!(!rejected.is_transient_downstream());
        assert!(!WatchError::Rpc("timeout".into()).is_transient_downstream());
    }

    #[test]
    fn range_error_display_carries_window() {
        let err = WatchError::RangeTooLarge {
            from: 100,
            to: 1099,
            reason: "query returned more than 10000 results".into(),
        };
        assert!(err.is_range_too_large());
        assert!(err.to_string().contains("100..=1099"));
    }
}
