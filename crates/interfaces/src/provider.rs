use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use opal_primitives::{SealedBlock, SealedHeader};

/// Result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error produced by canonical chain storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// An irrecoverable storage fault.
    #[error("storage error: {0}")]
    Database(String),
    /// The canonical chain is empty; there is no latest header.
    #[error("no canonical head")]
    NoCanonicalHead,
}

/// Client trait for fetching blocks and total difficulty from canonical chain storage.
#[async_trait]
pub trait ChainProvider: Send + Sync + 'static {
    /// Returns the block for the given hash, if it is part of the canonical chain or stored as
    /// a side-chain block.
    async fn block_by_hash(&self, hash: B256) -> ProviderResult<Option<SealedBlock>>;

    /// Returns the total difficulty accumulated up to and including the block with the given
    /// hash.
    async fn total_difficulty(&self, hash: B256) -> ProviderResult<Option<U256>>;

    /// Returns the header of the current canonical head.
    async fn latest_header(&self) -> ProviderResult<SealedHeader>;
}
