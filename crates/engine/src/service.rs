use crate::{EngineError, RemoteBlockCache};
use alloy_primitives::B256;
use opal_interfaces::{BeaconSync, BuiltBlock, ChainProvider, Execution, TransactionPool};
use opal_payload_builder::{BlobBundle, PendingBlockBuilder};
use opal_primitives::ChainSpec;
use opal_rpc_types::{PayloadId, TransitionConfiguration};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::Mutex;
use tracing::info;

/// How recent the promoted head's timestamp has to be for the node to consider itself
/// synchronized with the network.
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(30);

/// Tunables of the engine service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether forkchoice updates may lazily switch the node into beacon-sync mode.
    pub beacon_sync: bool,
    /// Head timestamps older than this leave the node marked as still syncing.
    pub recency_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { beacon_sync: true, recency_window: DEFAULT_RECENCY_WINDOW }
    }
}

/// Mutable engine state, guarded by a single lock.
///
/// Payload validation, forkchoice reorgs and payload finalization all read or write the caches
/// below and the canonical-head/state-root view of the execution collaborator; funnelling them
/// through one mutual-exclusion domain keeps a reorg from being observed mid-update.
pub(crate) struct EngineState<E: Execution, P> {
    /// Accepted blocks awaiting forkchoice promotion.
    pub(crate) remote_blocks: RemoteBlockCache,
    /// In-flight payload builds.
    pub(crate) pending: PendingBlockBuilder<E, P>,
    /// Whether a recent enough head has been promoted to call the node synchronized. Flips to
    /// `true` once and stays set; stale heads promoted later do not clear it.
    pub(crate) synchronized: bool,
    /// The highest head height promoted while synchronized; gates repeat flips of the flag.
    pub(crate) sync_target_height: Option<u64>,
}

/// The Engine API state machine: validates payloads from the consensus layer, tracks its
/// head/safe/finalized view and builds new payloads on demand.
pub struct EngineService<C, E: Execution, P, S> {
    pub(crate) chain: Arc<C>,
    pub(crate) execution: E,
    pub(crate) pool: Arc<P>,
    pub(crate) sync: S,
    pub(crate) chain_spec: Arc<ChainSpec>,
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState<E, P>>,
}

impl<C, E, P, S> EngineService<C, E, P, S>
where
    C: ChainProvider,
    E: Execution,
    P: TransactionPool,
    S: BeaconSync,
{
    /// Wires the engine to its collaborators.
    pub fn new(
        chain: Arc<C>,
        execution: E,
        pool: Arc<P>,
        sync: S,
        chain_spec: Arc<ChainSpec>,
        config: EngineConfig,
    ) -> Self {
        let pending = PendingBlockBuilder::new(pool.clone(), chain_spec.clone());
        Self {
            chain,
            execution,
            pool,
            sync,
            chain_spec,
            config,
            state: Mutex::new(EngineState {
                remote_blocks: RemoteBlockCache::default(),
                pending,
                synchronized: false,
                sync_target_height: None,
            }),
        }
    }

    /// Finalizes the pending build with the given id, persists the block without moving the
    /// canonical head and returns it together with its receipts and accrued fees.
    ///
    /// Fails with [`EngineError::UnknownPayload`] if no build with that id is in flight.
    pub async fn get_payload(&self, id: PayloadId) -> Result<BuiltBlock, EngineError> {
        let mut state = self.state.lock().await;
        let Some(built) = state.pending.build(id).await? else {
            return Err(EngineError::UnknownPayload)
        };
        self.execution
            .run_without_set_head(&built.block, None, Some(built.receipts.clone()))
            .await?;
        info!(
            target: "engine",
            %id,
            hash = %built.block.hash(),
            number = built.block.number,
            "Returning built payload"
        );
        Ok(built)
    }

    /// Returns the blob bundle accumulated for the payload id. Single use: the bundle is
    /// deleted on retrieval and a repeat call fails with [`EngineError::UnknownPayload`].
    pub async fn blobs_bundle(&self, id: PayloadId) -> Result<BlobBundle, EngineError> {
        let mut state = self.state.lock().await;
        state.pending.take_blobs_bundle(id).ok_or(EngineError::UnknownPayload)
    }

    /// Abandons the pending build with the given id, reverting its state copy. A no-op for
    /// unknown ids.
    pub async fn stop_payload(&self, id: PayloadId) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.pending.stop(id).await?;
        Ok(())
    }

    /// Cross-checks the consensus layer's view of the merge transition against the configured
    /// one. The terminal block hash and number are echoed back; only the total-difficulty
    /// threshold is compared.
    pub fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> Result<TransitionConfiguration, EngineError> {
        let Some(ttd) = self.chain_spec.terminal_total_difficulty else {
            return Err(EngineError::Internal(
                "terminalTotalDifficulty not configured for this chain".to_string(),
            ))
        };
        if config.terminal_total_difficulty != ttd {
            return Err(EngineError::InvalidParams(format!(
                "terminalTotalDifficulty set to {ttd}, received {}",
                config.terminal_total_difficulty
            )))
        }
        Ok(TransitionConfiguration { terminal_total_difficulty: ttd, ..config })
    }

    /// Returns `true` once a promoted head has been recent enough to call the node
    /// synchronized with the network.
    pub async fn is_synchronized(&self) -> bool {
        self.state.lock().await.synchronized
    }

    /// Resolves a hash against canonical storage, for `latestValidHash` reporting.
    pub(crate) async fn resolve_valid_hash(
        &self,
        hash: B256,
    ) -> Result<Option<B256>, EngineError> {
        Ok(self.chain.block_by_hash(hash).await?.map(|block| block.hash()))
    }
}

/// Seconds since the Unix epoch; zero if the system clock reads before it.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
