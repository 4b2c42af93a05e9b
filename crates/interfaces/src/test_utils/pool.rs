use crate::pool::TransactionPool;
use alloy_primitives::B256;
use async_trait::async_trait;
use opal_primitives::{PooledTransaction, SealedBlock};
use parking_lot::RwLock;
use std::collections::HashSet;

/// In-memory transaction pool. `best_transactions` answers in insertion order, which stands in
/// for the price-then-nonce order of a real pool and keeps fills deterministic.
#[derive(Debug, Default)]
pub struct MockPool {
    txs: RwLock<Vec<PooledTransaction>>,
    removed: RwLock<Vec<B256>>,
    run_state_updates: RwLock<Vec<bool>>,
}

impl MockPool {
    /// Adds a transaction to the back of the pool.
    pub fn add_transaction(&self, tx: PooledTransaction) {
        self.txs.write().push(tx);
    }

    /// Hashes removed from the pool so far, in removal order.
    pub fn removed_hashes(&self) -> Vec<B256> {
        self.removed.read().clone()
    }

    /// The `refresh_run_state` calls observed so far.
    pub fn run_state_updates(&self) -> Vec<bool> {
        self.run_state_updates.read().clone()
    }

    /// Number of transactions currently in the pool.
    pub fn len(&self) -> usize {
        self.txs.read().len()
    }

    /// Returns `true` if the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.txs.read().is_empty()
    }
}

#[async_trait]
impl TransactionPool for MockPool {
    async fn best_transactions(&self, _base_fee: Option<u64>) -> Vec<PooledTransaction> {
        self.txs.read().clone()
    }

    async fn remove_by_hash(&self, hash: B256) {
        self.txs.write().retain(|tx| *tx.tx_hash() != hash);
        self.removed.write().push(hash);
    }

    async fn remove_mined_transactions(&self, blocks: &[SealedBlock]) {
        let mined: HashSet<B256> =
            blocks.iter().flat_map(|block| block.body.iter().map(|tx| *tx.tx_hash())).collect();
        let mut txs = self.txs.write();
        let mut removed = self.removed.write();
        txs.retain(|tx| {
            let hash = *tx.tx_hash();
            if mined.contains(&hash) {
                removed.push(hash);
                false
            } else {
                true
            }
        });
    }

    async fn refresh_run_state(&self, synchronized: bool) {
        self.run_state_updates.write().push(synchronized);
    }
}
