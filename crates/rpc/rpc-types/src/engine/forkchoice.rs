use super::{PayloadId, PayloadStatus, PayloadStatusEnum};
use alloy_primitives::{Address, B256};
use opal_primitives::Withdrawal;
use serde::{Deserialize, Serialize};

/// The consensus layer's view of the chain: head, safe and finalized block hashes. The all-zero
/// hash is the "not yet set" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceState {
    /// Hash of the head block.
    pub head_block_hash: B256,
    /// Hash of the most recent "safe" block; must be the head or one of its ancestors.
    pub safe_block_hash: B256,
    /// Hash of the most recent finalized block.
    pub finalized_block_hash: B256,
}

impl ForkchoiceState {
    /// Returns `true` if the safe block hash is the unset sentinel.
    pub fn safe_block_hash_is_zero(&self) -> bool {
        self.safe_block_hash.is_zero()
    }

    /// Returns `true` if the finalized block hash is the unset sentinel.
    pub fn finalized_block_hash_is_zero(&self) -> bool {
        self.finalized_block_hash.is_zero()
    }
}

/// Attributes the consensus layer supplies when it wants a new payload built on the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    /// Timestamp of the payload to build.
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    /// Randomness beacon output to put in the new block's `mixHash`.
    pub prev_randao: B256,
    /// Suggested value for the coinbase of the new block.
    pub suggested_fee_recipient: Address,
    /// Withdrawals to process, once withdrawals are active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
}

/// The response of `engine_forkchoiceUpdated`: a payload status plus the id of the build the
/// attributes started, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdated {
    /// Status of the fork choice move.
    pub payload_status: PayloadStatus,
    /// The identifier of the started build.
    pub payload_id: Option<PayloadId>,
}

impl ForkchoiceUpdated {
    /// Creates a response from the given status, with no payload id.
    pub fn from_status(status: PayloadStatusEnum) -> Self {
        Self { payload_status: PayloadStatus::from_status(status), payload_id: None }
    }

    /// Sets the latest valid hash of the payload status.
    pub fn with_latest_valid_hash(mut self, hash: B256) -> Self {
        self.payload_status.latest_valid_hash = Some(hash);
        self
    }

    /// Sets the payload id.
    pub fn with_payload_id(mut self, id: PayloadId) -> Self {
        self.payload_id = Some(id);
        self
    }

    /// Returns `true` if the status is `SYNCING`.
    pub fn is_syncing(&self) -> bool {
        self.payload_status.status.is_syncing()
    }
}
