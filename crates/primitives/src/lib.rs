//! Commonly used types for the opal engine layer.
//!
//! Canonical blocks use a header shape where the fee-market, withdrawal and blob fields are
//! optional trailing RLP fields; transactions are the `alloy-consensus` envelopes.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

pub mod constants;

mod block;
mod chain_spec;
mod header;
mod receipt;
mod transaction;

pub use block::{Block, SealedBlock};
pub use chain_spec::ChainSpec;
pub use header::{Header, SealedHeader};
pub use receipt::Receipt;
pub use transaction::{strip_blob_sidecar, PooledTransaction, TransactionSigned};

// Re-export the pieces of the alloy stack that make up the public vocabulary of this crate.
pub use alloy_consensus::proofs;
pub use alloy_eips::{
    eip1559::BaseFeeParams,
    eip4844::BlobTransactionSidecar,
    eip4895::Withdrawal,
};
pub use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
