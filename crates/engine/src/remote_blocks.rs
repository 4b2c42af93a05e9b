use alloy_primitives::B256;
use lru::LruCache;
use opal_primitives::SealedBlock;
use std::num::NonZeroUsize;

/// Default number of accepted-but-not-yet-canonical blocks retained.
pub const DEFAULT_REMOTE_BLOCK_CAPACITY: usize = 256;

/// Bounded store of blocks accepted via `newPayload` that are not part of the canonical chain
/// yet. Forkchoice head resolution falls back to this cache when neither canonical storage nor
/// the sync skeleton knows the hash; entries are dropped once promoted to head, and the least
/// recently touched entry is evicted when the cache is full.
#[derive(Debug)]
pub struct RemoteBlockCache {
    blocks: LruCache<B256, SealedBlock>,
}

impl RemoteBlockCache {
    /// Creates a cache retaining at most `capacity` blocks.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { blocks: LruCache::new(capacity) }
    }

    /// Stores a block keyed by its hash.
    pub fn insert(&mut self, block: SealedBlock) {
        self.blocks.put(block.hash(), block);
    }

    /// Looks up a block, marking it as recently used.
    pub fn get(&mut self, hash: B256) -> Option<&SealedBlock> {
        self.blocks.get(&hash)
    }

    /// Removes and returns the block with the given hash.
    pub fn remove(&mut self, hash: B256) -> Option<SealedBlock> {
        self.blocks.pop(&hash)
    }

    /// Number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are cached.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Default for RemoteBlockCache {
    fn default() -> Self {
        // capacity is non-zero
        Self::new(NonZeroUsize::new(DEFAULT_REMOTE_BLOCK_CAPACITY).unwrap())
    }
}
