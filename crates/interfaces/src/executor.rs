use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use opal_primitives::{PooledTransaction, Receipt, SealedBlock, Withdrawal};

/// Error produced by the execution collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Executing a block against its parent state failed.
    #[error("execution of block {hash} failed: {message}")]
    BlockExecution {
        /// Hash of the failing block.
        hash: B256,
        /// Collaborator-provided failure description.
        message: String,
    },
    /// A state root required to run a block is not present.
    #[error("missing state root {0}")]
    MissingStateRoot(B256),
    /// Any other execution fault.
    #[error("{0}")]
    Internal(String),
}

/// Why an incremental builder refused a transaction.
#[derive(Debug, thiserror::Error)]
pub enum AddTransactionError {
    /// The transaction declares more gas than is left in the block.
    #[error("transaction gas limit exceeds remaining block gas")]
    ExceedsBlockGas,
    /// The transaction was produced for different hardfork rules than the block is built with.
    #[error("transaction hardfork does not match the block environment")]
    HardforkMismatch,
    /// The transaction is not currently executable (stale nonce, insufficient balance, ...).
    #[error("{0}")]
    Invalid(String),
}

/// Everything needed to seed an incremental block builder on top of a parent block.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Post-state root of the parent block; the builder's private state is rooted here.
    pub parent_state_root: B256,
    /// Number of the block under construction.
    pub number: u64,
    /// Gas limit, inherited from the parent.
    pub gas_limit: u64,
    /// Timestamp requested by the consensus layer.
    pub timestamp: u64,
    /// Randomness beacon output for the new block (`mixHash`).
    pub prev_randao: B256,
    /// Fee recipient requested by the consensus layer.
    pub suggested_fee_recipient: Address,
    /// Base fee of the block under construction, if the fee market is active.
    pub base_fee_per_gas: Option<u64>,
    /// Provisional excess data gas, if the blob fee market is active.
    pub excess_data_gas: Option<u64>,
    /// Extra data for the new block.
    pub extra_data: Bytes,
    /// Withdrawals to apply, if withdrawals are active.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

/// The output of a finalized block build.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// The sealed block.
    pub block: SealedBlock,
    /// Receipts of the included transactions, in order.
    pub receipts: Vec<Receipt>,
    /// Total value accrued to the fee recipient.
    pub fees: U256,
}

/// The execution/VM collaborator.
///
/// `run_without_set_head` and `set_head` separate block execution from canonical head movement:
/// payload validation executes candidate chains without touching the head pointer, fork choice
/// later promotes already-executed blocks.
#[async_trait]
pub trait Execution: Send + Sync + 'static {
    /// A private copy of execution state, detached from canonical head movement.
    type State: ExecutionState;

    /// Returns `true` if the post-state with the given root has been computed and persisted.
    async fn has_state_root(&self, root: B256) -> Result<bool, ExecutionError>;

    /// Executes the block on top of the given state root (the block's stored parent state when
    /// `None`) and persists its outcome without moving the canonical head. Pre-computed
    /// `receipts` are persisted alongside when provided.
    async fn run_without_set_head(
        &self,
        block: &SealedBlock,
        state_root: Option<B256>,
        receipts: Option<Vec<Receipt>>,
    ) -> Result<(), ExecutionError>;

    /// Atomically advances the canonical head through the given already-executed blocks,
    /// oldest first.
    async fn set_head(&self, blocks: &[SealedBlock]) -> Result<(), ExecutionError>;

    /// Returns a private copy of the current execution state for block building.
    async fn copy_state(&self) -> Result<Self::State, ExecutionError>;
}

/// A detached copy of execution state, consumed to start one block build.
#[async_trait]
pub trait ExecutionState: Send + 'static {
    /// The incremental builder this state produces.
    type Builder: BlockBuilder;

    /// Roots the state at `ctx.parent_state_root` and opens an incremental block builder.
    async fn build_block(self, ctx: BuildContext) -> Result<Self::Builder, ExecutionError>;
}

/// Incrementally executes transactions into an open block.
#[async_trait]
pub trait BlockBuilder: Send + 'static {
    /// Executes the transaction and appends it to the open block.
    async fn add_transaction(&mut self, tx: &PooledTransaction)
        -> Result<(), AddTransactionError>;

    /// Gas used by the transactions added so far.
    fn gas_used(&self) -> u64;

    /// Finalizes the block: computes the final roots and seals it. The builder stays usable
    /// for [`revert`](Self::revert) when finalization fails.
    async fn build(&mut self) -> Result<BuiltBlock, ExecutionError>;

    /// Discards the builder, reverting its uncommitted state changes.
    async fn revert(self) -> Result<(), ExecutionError>;
}
