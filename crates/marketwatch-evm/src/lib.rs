//! marketwatch-evm: EVM side of the marketplace watcher.
//!
//! - [`abi`]: event signature table, log payload and `getProduct` decoding
//! - [`decoder::MarketplaceDecoder`]: raw log → `DomainEvent`
//! - [`source::RpcChainSource`]: `ChainSource` over JSON-RPC (HTTP, plus
//!   WebSocket or HTTP polling for live logs)

pub mod abi;
pub mod decoder;
pub mod http;
pub mod log;
pub mod rpc;
pub mod source;
pub mod ws;

pub use abi::{MarketplaceEvent, PRICE_SCALE};
pub use decoder::MarketplaceDecoder;
pub use http::{HttpTransport, HttpTransportConfig, RetryConfig};
pub use rpc::TransportError;
pub use source::{RpcChainSource, RpcSourceConfig};
pub use ws::WsConfig;
