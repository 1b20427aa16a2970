//! Tracing initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// "trace" | "debug" | "info" | "warn" | "error", or a full filter directive
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

/// Filter used when `RUST_LOG` is unset: the configured level, with the
/// HTTP stack kept quiet unless asked for explicitly.
fn directives(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("{level},hyper=warn,reqwest=warn,tungstenite=warn")
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
/// Call once, at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(&config.level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
