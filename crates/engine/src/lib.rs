//! The engine service: the execution-layer side of the Engine API.
//!
//! [`EngineService`] validates execution payloads delivered by the consensus layer
//! (`newPayload`), follows its head/safe/finalized view (`forkchoiceUpdated`) and assembles new
//! payloads from the transaction pool on demand (`getPayload`). Chain storage, execution, the
//! pool and beacon sync are consumed through the traits in `opal-interfaces`.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod error;
mod forkchoice;
mod remote_blocks;
mod service;
mod validator;

#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use remote_blocks::{RemoteBlockCache, DEFAULT_REMOTE_BLOCK_CAPACITY};
pub use service::{EngineConfig, EngineService, DEFAULT_RECENCY_WINDOW};
