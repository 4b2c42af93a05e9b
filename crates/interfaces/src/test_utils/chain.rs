use crate::provider::{ChainProvider, ProviderError, ProviderResult};
use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use opal_primitives::{SealedBlock, SealedHeader};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory canonical chain storage.
#[derive(Debug, Default)]
pub struct MockChain {
    blocks: RwLock<HashMap<B256, SealedBlock>>,
    tds: RwLock<HashMap<B256, U256>>,
    latest: RwLock<Option<SealedHeader>>,
}

impl MockChain {
    /// Stores a block without touching the canonical head.
    pub fn insert_block(&self, block: SealedBlock) {
        self.blocks.write().insert(block.hash(), block);
    }

    /// Stores a block and makes it the canonical head.
    pub fn extend_canonical(&self, block: SealedBlock) {
        *self.latest.write() = Some(block.header.clone());
        self.insert_block(block);
    }

    /// Sets the total difficulty recorded for a block hash.
    pub fn insert_td(&self, hash: B256, td: U256) {
        self.tds.write().insert(hash, td);
    }

    /// Overrides the canonical head header.
    pub fn set_latest(&self, header: SealedHeader) {
        *self.latest.write() = Some(header);
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn block_by_hash(&self, hash: B256) -> ProviderResult<Option<SealedBlock>> {
        Ok(self.blocks.read().get(&hash).cloned())
    }

    async fn total_difficulty(&self, hash: B256) -> ProviderResult<Option<U256>> {
        Ok(self.tds.read().get(&hash).copied())
    }

    async fn latest_header(&self) -> ProviderResult<SealedHeader> {
        self.latest.read().clone().ok_or(ProviderError::NoCanonicalHead)
    }
}
