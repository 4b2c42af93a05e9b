use alloy_primitives::B256;
use async_trait::async_trait;
use opal_primitives::SealedBlock;

/// The beacon (skeleton) sync collaborator: a reverse header/block skeleton filled from
/// consensus-layer announcements while the node catches up.
#[async_trait]
pub trait BeaconSync: Send + Sync + 'static {
    /// Whether beacon sync has been activated.
    fn is_active(&self) -> bool;

    /// Activates beacon sync. Idempotent.
    async fn activate(&self);

    /// Tries to link the announced block into the skeleton. Returns `true` if the skeleton
    /// accepted it, meaning the block will be backfilled and a `SYNCING` answer is honest.
    async fn extend_chain(&self, block: &SealedBlock) -> bool;

    /// Informs the skeleton of the consensus layer's head block.
    async fn set_head(&self, head: &SealedBlock);

    /// Returns the block if the skeleton holds it.
    async fn block_by_hash(&self, hash: B256) -> Option<SealedBlock>;
}

/// A [`BeaconSync`] that is never active; for nodes running without a sync service.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct NoopSync;

#[async_trait]
impl BeaconSync for NoopSync {
    fn is_active(&self) -> bool {
        false
    }

    async fn activate(&self) {}

    async fn extend_chain(&self, _block: &SealedBlock) -> bool {
        false
    }

    async fn set_head(&self, _head: &SealedBlock) {}

    async fn block_by_hash(&self, _hash: B256) -> Option<SealedBlock> {
        None
    }
}
