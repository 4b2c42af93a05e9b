use alloy_eips::eip4844::{Blob, Bytes48};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// The blobs and KZG commitments carried by the blob transactions of one built payload, answered
/// on `engine_getBlobsBundleV1`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundleV1 {
    /// Hash of the block the bundle belongs to.
    pub block_hash: B256,
    /// The KZG commitments, one per blob, in blob order.
    pub kzgs: Vec<Bytes48>,
    /// The blobs, in transaction order then in-transaction order.
    pub blobs: Vec<Blob>,
}
