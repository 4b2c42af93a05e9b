//! Trait definitions of the RPC surface, one jsonrpsee trait per namespace. The server
//! implementations live in `opal-rpc-engine-api`; enabling the `client` feature additionally
//! generates typed clients.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod engine;

pub use engine::EngineApiServer;
#[cfg(feature = "client")]
pub use engine::EngineApiClient;
