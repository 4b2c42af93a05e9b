//! Traits through which the opal engine layer consumes the rest of an execution node: canonical
//! chain storage, the execution/VM collaborator, the transaction pool and beacon sync.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

/// Canonical chain storage.
pub mod provider;

/// Execution/VM collaborator and incremental block building.
pub mod executor;

/// Transaction pool.
pub mod pool;

/// Beacon (skeleton) sync.
pub mod sync;

/// Common test helpers and mock collaborators.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use executor::{
    AddTransactionError, BlockBuilder, BuildContext, BuiltBlock, Execution, ExecutionError,
    ExecutionState,
};
pub use pool::TransactionPool;
pub use provider::{ChainProvider, ProviderError, ProviderResult};
pub use sync::{BeaconSync, NoopSync};
