use alloy_primitives::B256;
use async_trait::async_trait;
use opal_primitives::{PooledTransaction, SealedBlock};

/// The transaction pool as seen by the block builder and fork choice.
#[async_trait]
pub trait TransactionPool: Send + Sync + 'static {
    /// Returns the currently executable transactions, ordered by effective price (descending)
    /// and per-sender nonce (ascending). The order must be stable for identical pool contents.
    async fn best_transactions(&self, base_fee: Option<u64>) -> Vec<PooledTransaction>;

    /// Removes the transaction with the given hash from the pool.
    async fn remove_by_hash(&self, hash: B256);

    /// Removes every transaction included in the given canonicalized blocks.
    async fn remove_mined_transactions(&self, blocks: &[SealedBlock]);

    /// Re-evaluates whether the pool should process transactions, given the node's
    /// synchronization state.
    async fn refresh_run_state(&self, synchronized: bool);
}
