use crate::sync::BeaconSync;
use alloy_primitives::B256;
use async_trait::async_trait;
use opal_primitives::SealedBlock;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

/// In-memory beacon-sync skeleton.
#[derive(Debug, Default)]
pub struct MockSync {
    active: AtomicBool,
    linkable: AtomicBool,
    blocks: RwLock<HashMap<B256, SealedBlock>>,
    extended: RwLock<Vec<B256>>,
    heads: RwLock<Vec<B256>>,
}

impl MockSync {
    /// Controls whether `extend_chain` reports the skeleton as linked.
    pub fn set_linkable(&self, linkable: bool) {
        self.linkable.store(linkable, Ordering::Relaxed);
    }

    /// Stores a block in the skeleton so head resolution can find it.
    pub fn insert_block(&self, block: SealedBlock) {
        self.blocks.write().insert(block.hash(), block);
    }

    /// Hashes passed to `extend_chain`, in call order.
    pub fn extended_with(&self) -> Vec<B256> {
        self.extended.read().clone()
    }

    /// Head hashes announced via `set_head`, in call order.
    pub fn announced_heads(&self) -> Vec<B256> {
        self.heads.read().clone()
    }
}

#[async_trait]
impl BeaconSync for MockSync {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    async fn activate(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    async fn extend_chain(&self, block: &SealedBlock) -> bool {
        self.extended.write().push(block.hash());
        self.linkable.load(Ordering::Relaxed)
    }

    async fn set_head(&self, head: &SealedBlock) {
        self.heads.write().push(head.hash());
    }

    async fn block_by_hash(&self, hash: B256) -> Option<SealedBlock> {
        self.blocks.read().get(&hash).cloned()
    }
}
