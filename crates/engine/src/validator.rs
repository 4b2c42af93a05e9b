//! Payload validation: assembles `newPayload` wire payloads into blocks, executes them without
//! moving the canonical head and classifies the outcome.

use crate::{service::EngineState, EngineError, EngineService};
use alloy_primitives::{B256, U256};
use opal_interfaces::{BeaconSync, ChainProvider, Execution, TransactionPool};
use opal_primitives::{SealedBlock, SealedHeader};
use opal_rpc_types::{ExecutionPayload, PayloadStatus, PayloadStatusEnum};
use tracing::{debug, info, warn};

/// How many side-branch ancestors a candidate may be away from the canonical chain before
/// validation gives up and reports `SYNCING`.
pub(crate) const MAX_ANCESTOR_LOOKUP_DEPTH: usize = 128;

impl<C, E, P, S> EngineService<C, E, P, S>
where
    C: ChainProvider,
    E: Execution,
    P: TransactionPool,
    S: BeaconSync,
{
    /// Validates an execution payload received from the consensus layer.
    ///
    /// Chain-semantic rejections come back inside the [`PayloadStatus`]; only collaborator
    /// faults escape as errors. Safe to call repeatedly with the same payload: an
    /// already-executed block short-circuits to `VALID`.
    pub async fn new_payload(&self, payload: ExecutionPayload) -> Result<PayloadStatus, EngineError> {
        let parent_hash = payload.parent_hash();
        let number = payload.block_number();
        let block = match payload.try_into_sealed_block() {
            Ok(block) => block,
            Err(error) => {
                warn!(target: "engine", %error, number, "Rejecting malformed payload");
                let latest_valid_hash = self.resolve_valid_hash(parent_hash).await?;
                let status = if error.is_block_hash_mismatch() {
                    PayloadStatusEnum::InvalidBlockHash { validation_error: error.to_string() }
                } else {
                    PayloadStatusEnum::Invalid { validation_error: Some(error.to_string()) }
                };
                return Ok(PayloadStatus::new(status, latest_valid_hash))
            }
        };
        let hash = block.hash();

        let mut state = self.state.lock().await;

        // keep the sync skeleton current regardless of the validation outcome
        let extended = self.sync.is_active() && self.sync.extend_chain(&block).await;

        if let Some(known) = self.chain.block_by_hash(hash).await? {
            if self.execution.has_state_root(known.state_root).await? {
                debug!(target: "engine", %hash, "Payload already executed");
                return Ok(PayloadStatus::new(PayloadStatusEnum::Valid, Some(hash)))
            }
        }

        let Some(parent) = self.lookup_block(&mut state, parent_hash).await? else {
            debug!(target: "engine", %hash, %parent_hash, extended, "Payload parent unknown");
            state.remote_blocks.insert(block);
            return Ok(PayloadStatus::from_status(accepted_or_syncing(extended)))
        };

        // the first post-merge block must descend from a terminal PoW block
        if parent.difficulty > U256::ZERO && !self.is_terminal_block(&parent.header).await? {
            warn!(target: "engine", %hash, %parent_hash, "Payload parent is a non-terminal PoW block");
            return Ok(PayloadStatus::new(
                PayloadStatusEnum::Invalid { validation_error: None },
                Some(B256::ZERO),
            ))
        }

        if !self.execution.has_state_root(parent.state_root).await? {
            debug!(target: "engine", %hash, %parent_hash, extended, "Payload parent not executed yet");
            state.remote_blocks.insert(block);
            return Ok(PayloadStatus::from_status(accepted_or_syncing(extended)))
        }

        let Some((boundary_root, ancestors)) =
            self.connecting_blocks(&mut state, parent_hash).await?
        else {
            debug!(target: "engine", %hash, "No connected path from the canonical chain to the payload");
            return Ok(PayloadStatus::from_status(PayloadStatusEnum::Syncing))
        };

        // run the side-branch ancestors and then the candidate, each on its parent's post-state
        let mut parent_root = boundary_root;
        for ancestor in &ancestors {
            if let Err(error) =
                self.execution.run_without_set_head(ancestor, Some(parent_root), None).await
            {
                warn!(target: "engine", %error, ancestor = %ancestor.hash(), "Ancestor execution failed");
                return Ok(PayloadStatus::new(
                    PayloadStatusEnum::Invalid { validation_error: Some(error.to_string()) },
                    self.resolve_valid_hash(parent_hash).await?,
                ))
            }
            parent_root = ancestor.state_root;
        }
        debug_assert_eq!(parent_root, parent.state_root);
        if let Err(error) =
            self.execution.run_without_set_head(&block, Some(parent_root), None).await
        {
            warn!(target: "engine", %error, %hash, "Payload execution failed");
            return Ok(PayloadStatus::new(
                PayloadStatusEnum::Invalid { validation_error: Some(error.to_string()) },
                self.resolve_valid_hash(parent_hash).await?,
            ))
        }

        state.remote_blocks.insert(block);
        info!(target: "engine", %hash, number, "Payload validated");
        Ok(PayloadStatus::new(PayloadStatusEnum::Valid, Some(hash)))
    }

    /// Resolves a block by hash against canonical storage, the sync skeleton and the
    /// remote-block cache, in that order.
    pub(crate) async fn lookup_block(
        &self,
        state: &mut EngineState<E, P>,
        hash: B256,
    ) -> Result<Option<SealedBlock>, EngineError> {
        if let Some(block) = self.chain.block_by_hash(hash).await? {
            return Ok(Some(block))
        }
        if self.sync.is_active() {
            if let Some(block) = self.sync.block_by_hash(hash).await {
                return Ok(Some(block))
            }
        }
        Ok(state.remote_blocks.get(hash).cloned())
    }

    /// Collects the side-branch blocks linking the canonical chain to the block with hash
    /// `target` (inclusive), oldest first, together with the stored post-state root the first
    /// of them builds on. The walk stops at the first ancestor found in canonical storage, so
    /// it crosses fork points between competing branches. `None` when the path has a gap or
    /// exceeds [`MAX_ANCESTOR_LOOKUP_DEPTH`].
    pub(crate) async fn connecting_blocks(
        &self,
        state: &mut EngineState<E, P>,
        target: B256,
    ) -> Result<Option<(B256, Vec<SealedBlock>)>, EngineError> {
        if target.is_zero() {
            return Ok(Some((B256::ZERO, Vec::new())))
        }
        let mut chain = Vec::new();
        let mut next = target;
        loop {
            if let Some(stored) = self.chain.block_by_hash(next).await? {
                chain.reverse();
                return Ok(Some((stored.state_root, chain)))
            }
            let Some(block) = self.lookup_block(state, next).await? else {
                debug!(target: "engine", missing = %next, %target, "Gap in the ancestry of the target block");
                return Ok(None)
            };
            next = block.parent_hash;
            chain.push(block);
            if chain.len() >= MAX_ANCESTOR_LOOKUP_DEPTH {
                debug!(target: "engine", %target, "Ancestor lookup exceeded max depth");
                return Ok(None)
            }
        }
    }

    /// Whether the block satisfies the terminal-block condition: its total difficulty reaches
    /// the configured threshold while its parent's stays below it. The genesis block is
    /// terminal iff its own total difficulty already meets the threshold. Chains without a
    /// configured threshold have no PoW history to gate.
    pub(crate) async fn is_terminal_block(
        &self,
        header: &SealedHeader,
    ) -> Result<bool, EngineError> {
        let Some(ttd) = self.chain_spec.terminal_total_difficulty else { return Ok(true) };
        let Some(td) = self.chain.total_difficulty(header.hash()).await? else {
            return Ok(false)
        };
        if header.number == 0 {
            return Ok(td >= ttd)
        }
        let Some(parent_td) = self.chain.total_difficulty(header.parent_hash).await? else {
            return Ok(false)
        };
        Ok(td >= ttd && parent_td < ttd)
    }
}

const fn accepted_or_syncing(sync_extended: bool) -> PayloadStatusEnum {
    if sync_extended {
        PayloadStatusEnum::Syncing
    } else {
        PayloadStatusEnum::Accepted
    }
}
