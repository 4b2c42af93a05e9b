use alloy_eips::eip4844::{Blob, Bytes48};
use alloy_primitives::B256;
use opal_primitives::PooledTransaction;
use opal_rpc_types::PayloadId;
use std::collections::HashMap;

/// The blobs and commitments accumulated for one pending payload.
#[derive(Debug, Clone, Default)]
pub struct BlobBundle {
    /// Hash of the (provisional or final) block the blobs belong to.
    pub block_hash: B256,
    /// KZG commitments, 1:1 with `blobs`.
    pub commitments: Vec<Bytes48>,
    /// Blobs, in transaction order then in-transaction order.
    pub blobs: Vec<Blob>,
}

/// Keyed store of the blob sidecars carried by each pending payload's transactions.
///
/// Bundles accumulate across the initial fill and rebuilds of the same payload id and are
/// single-use: [`take`](Self::take) removes the bundle it returns.
#[derive(Debug, Default)]
pub struct BlobBundleTracker {
    bundles: HashMap<PayloadId, BlobBundle>,
}

impl BlobBundleTracker {
    /// Appends the sidecar contents of the given blob transactions to the bundle for the id,
    /// creating it if absent, and overwrites the stored block hash.
    pub fn record(&mut self, id: PayloadId, txs: &[PooledTransaction], block_hash: B256) {
        let bundle = self.bundles.entry(id).or_default();
        for tx in txs {
            if let PooledTransaction::Eip4844(tx) = tx {
                let sidecar = &tx.tx().sidecar;
                bundle.blobs.extend(sidecar.blobs.iter().copied());
                bundle.commitments.extend(sidecar.commitments.iter().copied());
            }
        }
        bundle.block_hash = block_hash;
    }

    /// Returns and deletes the bundle for the id.
    pub fn take(&mut self, id: PayloadId) -> Option<BlobBundle> {
        self.bundles.remove(&id)
    }

    /// Discards the bundle for the id, if any.
    pub fn remove(&mut self, id: PayloadId) {
        self.bundles.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_interfaces::test_utils::{blob_tx, signed_tx};

    #[test]
    fn bundle_accumulates_in_order_and_is_single_use() {
        let mut tracker = BlobBundleTracker::default();
        let id = PayloadId::new([1; 8]);

        tracker.record(id, &[blob_tx(0, 2), signed_tx(1, 21_000, 10)], B256::with_last_byte(1));
        tracker.record(id, &[blob_tx(2, 1)], B256::with_last_byte(2));

        let bundle = tracker.take(id).unwrap();
        // non-blob transactions contribute nothing; the hash is the latest recorded one
        assert_eq!(bundle.blobs.len(), 3);
        assert_eq!(bundle.commitments.len(), 3);
        assert_eq!(bundle.block_hash, B256::with_last_byte(2));

        assert!(tracker.take(id).is_none());
    }
}
