//! Assembles pending blocks on consensus-layer demand.
//!
//! A build starts from a detached copy of execution state at the requested parent, fills the
//! block from the transaction pool and parks it under a [`PayloadId`] until the consensus layer
//! either claims it with `engine_getPayload` or abandons it. Blob sidecars stripped from EIP-4844
//! transactions during inclusion are retained per payload in a [`BlobBundleTracker`].

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod blobs;
mod pending;

pub use blobs::{BlobBundle, BlobBundleTracker};
pub use pending::PendingBlockBuilder;

pub use opal_rpc_types::PayloadId;
