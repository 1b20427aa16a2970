//! marketwatch-sink: delivers marketplace domain events to the core API.
//!
//! | Domain event        | Request                                  |
//! |---------------------|------------------------------------------|
//! | `ProductDeployed`   | `POST /products/{id}/setDeployed`        |
//! | `ProductUndeployed` | `POST /products/{id}/setUndeployed`      |
//! | `ProductUpdated`    | `POST /products/{id}/setPricing`         |
//! | `Subscribed`        | `POST /subscriptions`                    |
//!
//! An unreachable API (connection refused, HTTP 503) surfaces as
//! `WatchError::SinkUnavailable` and is skipped by the engine; any other
//! failure surfaces as `WatchError::SinkRejected` and stops it.

pub mod client;
pub mod error;
pub mod handler;

pub use client::{CoreApiClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::SinkError;
pub use handler::{ReportingSink, HANDLER_NAME};
