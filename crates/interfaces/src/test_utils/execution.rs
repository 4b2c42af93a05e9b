use crate::executor::{
    AddTransactionError, BlockBuilder, BuildContext, BuiltBlock, Execution, ExecutionError,
    ExecutionState,
};
use alloy_consensus::Transaction;
use alloy_primitives::{keccak256, B256, U256};
use async_trait::async_trait;
use opal_primitives::{
    proofs, strip_blob_sidecar, Block, Header, PooledTransaction, Receipt, SealedBlock,
    TransactionSigned,
};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Deterministic state root the mock derives for a block: a digest of the parent state root and
/// the block number. Tests use it to assert that built state descends from the parent's.
pub fn derive_state_root(parent_state_root: B256, number: u64) -> B256 {
    let mut buf = [0u8; 40];
    buf[..32].copy_from_slice(parent_state_root.as_slice());
    buf[32..].copy_from_slice(&number.to_be_bytes());
    keccak256(buf)
}

#[derive(Debug, Default)]
struct MockExecutionInner {
    state_roots: HashSet<B256>,
    executed: Vec<B256>,
    failing_blocks: HashMap<B256, String>,
    failing_build: Option<String>,
    hardfork_mismatch_txs: HashSet<B256>,
    invalid_txs: HashMap<B256, String>,
    canonical_head: Option<B256>,
    set_head_batches: Vec<Vec<B256>>,
    reverted: usize,
}

/// In-memory execution/VM collaborator.
///
/// Blocks "execute" by recording their hash and registering their header state root as known.
/// Individual blocks and transactions can be marked as failing up front.
#[derive(Debug, Clone, Default)]
pub struct MockExecution {
    inner: Arc<RwLock<MockExecutionInner>>,
}

impl MockExecution {
    /// Creates a mock with no known state roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a state root as computed.
    pub fn insert_state_root(&self, root: B256) {
        self.inner.write().state_roots.insert(root);
    }

    /// Makes execution of the block with the given hash fail.
    pub fn fail_block(&self, hash: B256, message: impl Into<String>) {
        self.inner.write().failing_blocks.insert(hash, message.into());
    }

    /// Makes block finalization fail for every builder.
    pub fn fail_build(&self, message: impl Into<String>) {
        self.inner.write().failing_build = Some(message.into());
    }

    /// Makes builders reject the transaction as belonging to a different hardfork.
    pub fn mismatch_transaction(&self, hash: B256) {
        self.inner.write().hardfork_mismatch_txs.insert(hash);
    }

    /// Makes builders reject the transaction as currently not executable.
    pub fn invalidate_transaction(&self, hash: B256, reason: impl Into<String>) {
        self.inner.write().invalid_txs.insert(hash, reason.into());
    }

    /// Hashes of blocks run via `run_without_set_head`, in call order.
    pub fn executed_blocks(&self) -> Vec<B256> {
        self.inner.read().executed.clone()
    }

    /// The current canonical head hash, if `set_head` was called.
    pub fn canonical_head(&self) -> Option<B256> {
        self.inner.read().canonical_head
    }

    /// Block-hash batches passed to `set_head`, in call order.
    pub fn set_head_batches(&self) -> Vec<Vec<B256>> {
        self.inner.read().set_head_batches.clone()
    }

    /// Number of builders that were reverted.
    pub fn reverted_builders(&self) -> usize {
        self.inner.read().reverted
    }
}

#[async_trait]
impl Execution for MockExecution {
    type State = MockState;

    async fn has_state_root(&self, root: B256) -> Result<bool, ExecutionError> {
        Ok(self.inner.read().state_roots.contains(&root))
    }

    async fn run_without_set_head(
        &self,
        block: &SealedBlock,
        _state_root: Option<B256>,
        _receipts: Option<Vec<Receipt>>,
    ) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        if let Some(message) = inner.failing_blocks.get(&block.hash()) {
            return Err(ExecutionError::BlockExecution {
                hash: block.hash(),
                message: message.clone(),
            })
        }
        inner.executed.push(block.hash());
        inner.state_roots.insert(block.state_root);
        Ok(())
    }

    async fn set_head(&self, blocks: &[SealedBlock]) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        inner.set_head_batches.push(blocks.iter().map(|b| b.hash()).collect());
        if let Some(last) = blocks.last() {
            inner.canonical_head = Some(last.hash());
        }
        Ok(())
    }

    async fn copy_state(&self) -> Result<Self::State, ExecutionError> {
        Ok(MockState { inner: self.inner.clone() })
    }
}

/// Detached state copy handed out by [`MockExecution::copy_state`].
#[derive(Debug, Clone)]
pub struct MockState {
    inner: Arc<RwLock<MockExecutionInner>>,
}

#[async_trait]
impl ExecutionState for MockState {
    type Builder = MockBuilder;

    async fn build_block(self, ctx: BuildContext) -> Result<Self::Builder, ExecutionError> {
        Ok(MockBuilder {
            inner: self.inner,
            ctx,
            transactions: Vec::new(),
            receipts: Vec::new(),
            gas_used: 0,
            fees: U256::ZERO,
        })
    }
}

/// Incremental builder over [`MockState`]. Every transaction "uses" its full gas limit.
#[derive(Debug)]
pub struct MockBuilder {
    inner: Arc<RwLock<MockExecutionInner>>,
    ctx: BuildContext,
    transactions: Vec<TransactionSigned>,
    receipts: Vec<Receipt>,
    gas_used: u64,
    fees: U256,
}

#[async_trait]
impl BlockBuilder for MockBuilder {
    async fn add_transaction(
        &mut self,
        tx: &PooledTransaction,
    ) -> Result<(), AddTransactionError> {
        let hash = *tx.tx_hash();
        {
            let inner = self.inner.read();
            if inner.hardfork_mismatch_txs.contains(&hash) {
                return Err(AddTransactionError::HardforkMismatch)
            }
            if let Some(reason) = inner.invalid_txs.get(&hash) {
                return Err(AddTransactionError::Invalid(reason.clone()))
            }
        }
        if tx.gas_limit() > self.ctx.gas_limit - self.gas_used {
            return Err(AddTransactionError::ExceedsBlockGas)
        }

        self.gas_used += tx.gas_limit();
        let tip = tx.effective_tip_per_gas(self.ctx.base_fee_per_gas.unwrap_or(0)).unwrap_or(0);
        self.fees += U256::from(tip) * U256::from(tx.gas_limit());
        self.receipts.push(Receipt {
            success: true,
            cumulative_gas_used: self.gas_used,
            logs: Vec::new(),
        });
        self.transactions.push(strip_blob_sidecar(tx.clone()));
        Ok(())
    }

    fn gas_used(&self) -> u64 {
        self.gas_used
    }

    async fn build(&mut self) -> Result<BuiltBlock, ExecutionError> {
        if let Some(message) = self.inner.read().failing_build.clone() {
            return Err(ExecutionError::Internal(message))
        }
        let ctx = self.ctx.clone();
        let state_root = derive_state_root(ctx.parent_state_root, ctx.number);
        let transactions = std::mem::take(&mut self.transactions);
        let header = Header {
            parent_hash: ctx.parent_hash,
            beneficiary: ctx.suggested_fee_recipient,
            state_root,
            transactions_root: proofs::calculate_transaction_root(&transactions),
            withdrawals_root: ctx
                .withdrawals
                .as_deref()
                .map(proofs::calculate_withdrawals_root),
            number: ctx.number,
            gas_limit: ctx.gas_limit,
            gas_used: self.gas_used,
            timestamp: ctx.timestamp,
            extra_data: ctx.extra_data,
            mix_hash: ctx.prev_randao,
            base_fee_per_gas: ctx.base_fee_per_gas,
            excess_data_gas: ctx.excess_data_gas,
            ..Default::default()
        };
        let block = Block {
            header,
            body: transactions,
            ommers: Vec::new(),
            withdrawals: ctx.withdrawals,
        }
        .seal_slow();

        self.inner.write().state_roots.insert(state_root);
        Ok(BuiltBlock {
            block,
            receipts: std::mem::take(&mut self.receipts),
            fees: self.fees,
        })
    }

    async fn revert(self) -> Result<(), ExecutionError> {
        self.inner.write().reverted += 1;
        Ok(())
    }
}
