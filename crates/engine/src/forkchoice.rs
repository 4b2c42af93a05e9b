//! Fork choice: tracks the consensus layer's head/safe/finalized view, drives canonical-chain
//! reorgs and starts payload builds when attributes are supplied.

use crate::{service::unix_now, EngineError, EngineService};
use alloy_primitives::{B256, U256};
use opal_interfaces::{BeaconSync, ChainProvider, Execution, TransactionPool};
use opal_rpc_types::{ForkchoiceState, ForkchoiceUpdated, PayloadAttributes, PayloadStatusEnum};
use tracing::{debug, info, warn};

impl<C, E, P, S> EngineService<C, E, P, S>
where
    C: ChainProvider,
    E: Execution,
    P: TransactionPool,
    S: BeaconSync,
{
    /// Applies a forkchoice update from the consensus layer.
    ///
    /// Resolves the requested head, promotes it to the canonical head if it moved, and, when
    /// payload attributes are supplied, starts a build on top of it. The reorg is the only
    /// state-mutating step and runs under the engine lock, so concurrent payload validation and
    /// finalization never observe it half-applied.
    pub async fn fork_choice_updated(
        &self,
        fcu: ForkchoiceState,
        attrs: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineError> {
        let mut state = self.state.lock().await;

        // `newPayload` may arrive before any forkchoice update; sync starts here either way
        if self.config.beacon_sync && !self.sync.is_active() {
            self.sync.activate().await;
        }

        // resolve the head: canonical storage, sync skeleton, then accepted remote blocks
        let head = if let Some(block) = self.chain.block_by_hash(fcu.head_block_hash).await? {
            block
        } else if let Some(block) = self.sync.block_by_hash(fcu.head_block_hash).await {
            block
        } else if let Some(block) = state.remote_blocks.get(fcu.head_block_hash).cloned() {
            block
        } else {
            debug!(target: "engine", head = %fcu.head_block_hash, "Forkchoice head unknown");
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing))
        };

        if self.sync.is_active() {
            self.sync.set_head(&head).await;
        }

        // a PoW head is only acceptable as the terminal block of the transition
        if head.difficulty > U256::ZERO && !self.is_terminal_block(&head.header).await? {
            warn!(target: "engine", head = %head.hash(), "Forkchoice head is a non-terminal PoW block");
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Invalid {
                validation_error: None,
            })
            .with_latest_valid_hash(B256::ZERO))
        }

        if !self.execution.has_state_root(head.state_root).await? {
            debug!(target: "engine", head = %head.hash(), "Forkchoice head not executed yet");
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing))
        }

        let current = self.chain.latest_header().await?;
        if current.hash() != head.hash() {
            let Some((_, mut new_chain)) =
                self.connecting_blocks(&mut state, head.parent_hash).await?
            else {
                debug!(target: "engine", head = %head.hash(), "No connected path to the new head");
                return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing))
            };
            new_chain.push(head.clone());

            self.execution.set_head(&new_chain).await?;
            self.pool.remove_mined_transactions(&new_chain).await;
            state.remote_blocks.remove(head.hash());

            // the flag only flips forward: a stale head or one below the sync target never
            // clears it
            let recent = unix_now().saturating_sub(head.timestamp) <
                self.config.recency_window.as_secs();
            let past_target = state
                .sync_target_height
                .map_or(true, |target| target == 0 || target < head.number);
            if recent && past_target {
                state.synchronized = true;
                state.sync_target_height = Some(head.number);
                self.pool.refresh_run_state(true).await;
            }
            info!(
                target: "engine",
                head = %head.hash(),
                number = head.number,
                reorged = new_chain.len(),
                synchronized = state.synchronized,
                "Canonical head updated"
            );
        }

        if !fcu.safe_block_hash.is_zero() &&
            fcu.safe_block_hash != fcu.head_block_hash &&
            self.chain.block_by_hash(fcu.safe_block_hash).await?.is_none()
        {
            return Err(EngineError::ChainUnresolvable("safe"))
        }
        if !fcu.finalized_block_hash.is_zero() &&
            self.chain.block_by_hash(fcu.finalized_block_hash).await?.is_none()
        {
            return Err(EngineError::ChainUnresolvable("finalized"))
        }

        let mut response = ForkchoiceUpdated::from_status(PayloadStatusEnum::Valid)
            .with_latest_valid_hash(head.hash());
        if let Some(attrs) = attrs {
            if attrs.timestamp <= head.timestamp {
                return Err(EngineError::InvalidParams(format!(
                    "invalid timestamp: attributes timestamp {} not above head timestamp {}",
                    attrs.timestamp, head.timestamp
                )))
            }
            let exec_state = self.execution.copy_state().await?;
            let id = state.pending.start(exec_state, &head.header, &attrs).await?;
            debug!(target: "engine", %id, parent = %head.hash(), "Started payload build");
            response = response.with_payload_id(id);
        }
        Ok(response)
    }
}
