use crate::{BlobBundle, BlobBundleTracker};
use alloy_primitives::{Bytes, B256};
use opal_interfaces::{
    AddTransactionError, BlockBuilder, BuildContext, BuiltBlock, Execution, ExecutionError,
    ExecutionState, TransactionPool,
};
use opal_primitives::{
    constants::{INITIAL_EXCESS_DATA_GAS, MIN_TRANSACTION_GAS},
    proofs, ChainSpec, Header, PooledTransaction, SealedHeader,
};
use opal_rpc_types::{PayloadAttributes, PayloadId};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, error, info};

type BuilderOf<E> = <<E as Execution>::State as ExecutionState>::Builder;

struct PendingPayload<B> {
    builder: B,
    included: HashSet<B256>,
    gas_limit: u64,
    base_fee_per_gas: Option<u64>,
    blobs_active: bool,
}

/// Builds candidate blocks incrementally from a parent block and live pool contents, keyed by
/// an opaque 8-byte payload id.
///
/// Each payload owns a private copy of execution state taken at [`start`](Self::start) time, so
/// in-flight builds are unaffected by canonical head movement; only the
/// [`build`](Self::build)-time top-up consults the pool's then-current contents.
pub struct PendingBlockBuilder<E: Execution, P> {
    pool: Arc<P>,
    chain_spec: Arc<ChainSpec>,
    payloads: HashMap<PayloadId, PendingPayload<BuilderOf<E>>>,
    blob_bundles: BlobBundleTracker,
}

impl<E, P> PendingBlockBuilder<E, P>
where
    E: Execution,
    P: TransactionPool,
{
    /// Creates an empty registry of pending payloads.
    pub fn new(pool: Arc<P>, chain_spec: Arc<ChainSpec>) -> Self {
        Self { pool, chain_spec, payloads: HashMap::new(), blob_bundles: BlobBundleTracker::default() }
    }

    /// Starts building a pending block on top of `parent` and performs the first fill pass from
    /// the pool. Returns the fresh payload id the block can later be finalized with.
    pub async fn start(
        &mut self,
        state: E::State,
        parent: &SealedHeader,
        attrs: &PayloadAttributes,
    ) -> Result<PayloadId, ExecutionError> {
        let number = parent.number + 1;
        let gas_limit = parent.gas_limit;
        let base_fee_per_gas = parent.next_block_base_fee(self.chain_spec.base_fee_params);
        let blobs_active = self.chain_spec.is_cancun_active_at_timestamp(attrs.timestamp);
        let excess_data_gas = blobs_active.then_some(INITIAL_EXCESS_DATA_GAS);

        let ctx = BuildContext {
            parent_hash: parent.hash(),
            parent_state_root: parent.state_root,
            number,
            gas_limit,
            timestamp: attrs.timestamp,
            prev_randao: attrs.prev_randao,
            suggested_fee_recipient: attrs.suggested_fee_recipient,
            base_fee_per_gas,
            excess_data_gas,
            extra_data: Bytes::new(),
            withdrawals: attrs.withdrawals.clone(),
        };
        let mut builder = state.build_block(ctx).await?;

        let id = self.fresh_payload_id();

        let txs = self.pool.best_transactions(base_fee_per_gas).await;
        info!(
            target: "payload_builder",
            %id,
            eligible = txs.len(),
            base_fee = ?base_fee_per_gas,
            "Assembling pending block"
        );
        let mut included = HashSet::new();
        let (blob_txs, _) =
            fill(self.pool.as_ref(), &mut builder, &mut included, gas_limit, txs).await;

        if blobs_active {
            // The bundle is keyed to the provisional header until the block is finalized.
            let provisional = Header {
                parent_hash: parent.hash(),
                beneficiary: attrs.suggested_fee_recipient,
                number,
                gas_limit,
                timestamp: attrs.timestamp,
                mix_hash: attrs.prev_randao,
                base_fee_per_gas,
                withdrawals_root: attrs
                    .withdrawals
                    .as_deref()
                    .map(proofs::calculate_withdrawals_root),
                excess_data_gas,
                ..Default::default()
            };
            self.blob_bundles.record(id, &blob_txs, provisional.hash_slow());
        }

        self.payloads.insert(
            id,
            PendingPayload { builder, included, gas_limit, base_fee_per_gas, blobs_active },
        );
        Ok(id)
    }

    /// Tops the block up with transactions that arrived since [`start`](Self::start), finalizes
    /// it and drops the bookkeeping entry. Returns `None` if the id is unknown. A finalization
    /// error still reverts the state copy and discards the blob bundle.
    pub async fn build(&mut self, id: PayloadId) -> Result<Option<BuiltBlock>, ExecutionError> {
        let Some(mut payload) = self.payloads.remove(&id) else { return Ok(None) };

        let txs = self
            .pool
            .best_transactions(payload.base_fee_per_gas)
            .await
            .into_iter()
            .filter(|tx| !payload.included.contains(tx.tx_hash()))
            .collect::<Vec<_>>();
        debug!(target: "payload_builder", %id, additional = txs.len(), "Topping up pending block");
        let (blob_txs, skipped) = fill(
            self.pool.as_ref(),
            &mut payload.builder,
            &mut payload.included,
            payload.gas_limit,
            txs,
        )
        .await;

        let built = match payload.builder.build().await {
            Ok(built) => built,
            Err(error) => {
                // the id is spent either way; release the state copy and the start-time bundle
                error!(target: "payload_builder", %id, %error, "Failed to finalize pending block");
                if let Err(error) = payload.builder.revert().await {
                    error!(target: "payload_builder", %id, %error, "Failed to revert pending block state");
                }
                self.blob_bundles.remove(id);
                return Err(error)
            }
        };
        if payload.blobs_active {
            self.blob_bundles.record(id, &blob_txs, built.block.hash());
        }
        info!(
            target: "payload_builder",
            %id,
            number = built.block.number,
            txs = built.block.body.len(),
            withdrawals = built.block.withdrawals.as_ref().map_or(0, |w| w.len()),
            skipped,
            hash = %built.block.hash(),
            "Built pending block"
        );
        Ok(Some(built))
    }

    /// Reverts and discards the pending payload and its blob bundle. A no-op for unknown ids.
    pub async fn stop(&mut self, id: PayloadId) -> Result<(), ExecutionError> {
        let Some(payload) = self.payloads.remove(&id) else { return Ok(()) };
        payload.builder.revert().await?;
        self.blob_bundles.remove(id);
        debug!(target: "payload_builder", %id, "Stopped pending block");
        Ok(())
    }

    /// Returns and deletes the blob bundle accumulated for the id.
    pub fn take_blobs_bundle(&mut self, id: PayloadId) -> Option<BlobBundle> {
        self.blob_bundles.take(id)
    }

    /// Returns `true` if a build with the given id is in flight.
    pub fn contains(&self, id: PayloadId) -> bool {
        self.payloads.contains_key(&id)
    }

    fn fresh_payload_id(&self) -> PayloadId {
        loop {
            let id = PayloadId::new(rand::random());
            if !self.payloads.contains_key(&id) {
                return id
            }
        }
    }
}

/// One fill pass: attempts every transaction in order, stopping only when remaining gas drops
/// below the smallest possible transaction. Returns the appended blob transactions and the
/// count of transactions skipped due to add errors.
async fn fill<P: TransactionPool, B: BlockBuilder>(
    pool: &P,
    builder: &mut B,
    included: &mut HashSet<B256>,
    gas_limit: u64,
    txs: Vec<PooledTransaction>,
) -> (Vec<PooledTransaction>, usize) {
    let mut blob_txs = Vec::new();
    let mut skipped = 0;
    for tx in txs {
        let hash = *tx.tx_hash();
        match builder.add_transaction(&tx).await {
            Ok(()) => {
                included.insert(hash);
                if matches!(tx, PooledTransaction::Eip4844(_)) {
                    blob_txs.push(tx);
                }
            }
            Err(AddTransactionError::ExceedsBlockGas) => {
                // saturating: the gas limit can sit below the 21k floor (the protocol minimum
                // is 5k)
                if builder.gas_used() > gas_limit.saturating_sub(MIN_TRANSACTION_GAS) {
                    debug!(
                        target: "payload_builder",
                        gas_left = gas_limit.saturating_sub(builder.gas_used()),
                        "Pending block full"
                    );
                    break
                }
                // a smaller transaction later in the queue may still fit
            }
            Err(AddTransactionError::HardforkMismatch) => {
                // cannot be included under any current rules; the sender has to resubmit
                pool.remove_by_hash(hash).await;
                error!(target: "payload_builder", %hash, "Removed tx with mismatched hardfork from pool");
            }
            Err(AddTransactionError::Invalid(reason)) => {
                skipped += 1;
                debug!(target: "payload_builder", %hash, reason, "Skipping tx");
            }
        }
    }
    (blob_txs, skipped)
}
