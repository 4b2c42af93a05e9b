//! Mock collaborators and block/transaction generators used by the engine and builder tests.

mod chain;
mod execution;
mod generators;
mod pool;
mod sync;

pub use chain::MockChain;
pub use execution::{derive_state_root, MockBuilder, MockExecution, MockState};
pub use generators::{blob_tx, block_with_parent, signed_tx};
pub use pool::MockPool;
pub use sync::MockSync;
