use crate::{EngineConfig, EngineError, EngineService};
use alloy_primitives::{Address, Bytes, B256, U256};
use assert_matches::assert_matches;
use opal_interfaces::test_utils::{
    blob_tx, block_with_parent, derive_state_root, signed_tx, MockChain, MockExecution, MockPool,
    MockSync,
};
use opal_primitives::{proofs, strip_blob_sidecar, ChainSpec, SealedBlock};
use opal_rpc_types::{
    ExecutionPayload, ForkchoiceState, PayloadAttributes, PayloadId, PayloadStatusEnum,
    TransitionConfiguration,
};
use std::sync::Arc;

const TTD: u64 = 100;

type TestService = EngineService<MockChain, MockExecution, MockPool, MockSync>;

struct TestCtx {
    chain: Arc<MockChain>,
    execution: MockExecution,
    pool: Arc<MockPool>,
    service: TestService,
    genesis: SealedBlock,
}

fn test_spec() -> ChainSpec {
    ChainSpec {
        terminal_total_difficulty: Some(U256::from(TTD)),
        cancun_time: None,
        ..ChainSpec::mainnet()
    }
}

fn setup_with_spec(spec: ChainSpec) -> TestCtx {
    let chain = Arc::new(MockChain::default());
    let execution = MockExecution::new();
    let pool = Arc::new(MockPool::default());

    let genesis = block_with_parent(B256::ZERO, 0).seal_slow();
    chain.extend_canonical(genesis.clone());
    execution.insert_state_root(genesis.state_root);

    let service = EngineService::new(
        chain.clone(),
        execution.clone(),
        pool.clone(),
        MockSync::default(),
        Arc::new(spec),
        EngineConfig::default(),
    );
    TestCtx { chain, execution, pool, service, genesis }
}

fn setup() -> TestCtx {
    setup_with_spec(test_spec())
}

fn fcu_head(head: B256) -> ForkchoiceState {
    ForkchoiceState { head_block_hash: head, ..Default::default() }
}

fn attrs_on(parent: &SealedBlock) -> PayloadAttributes {
    PayloadAttributes {
        timestamp: parent.timestamp + 12,
        prev_randao: B256::with_last_byte(0x42),
        suggested_fee_recipient: Address::with_last_byte(0x99),
        withdrawals: None,
    }
}

mod new_payload {
    use super::*;

    #[tokio::test]
    async fn valid_payload_is_executed_and_stashed() {
        let ctx = setup();
        let child = block_with_parent(ctx.genesis.hash(), 1).seal_slow();

        let status = ctx.service.new_payload(child.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);
        assert_eq!(status.latest_valid_hash, Some(child.hash()));
        assert!(ctx.execution.executed_blocks().contains(&child.hash()));

        // the accepted block resolves as a forkchoice head straight from the cache
        let updated =
            ctx.service.fork_choice_updated(fcu_head(child.hash()), None).await.unwrap();
        assert_matches!(updated.payload_status.status, PayloadStatusEnum::Valid);
    }

    #[tokio::test]
    async fn repeated_payload_stays_valid() {
        let ctx = setup();
        let child = block_with_parent(ctx.genesis.hash(), 1).seal_slow();
        ctx.chain.insert_block(child.clone());

        let first = ctx.service.new_payload(child.clone().into()).await.unwrap();
        let second = ctx.service.new_payload(child.clone().into()).await.unwrap();
        assert_matches!(first.status, PayloadStatusEnum::Valid);
        assert_eq!(first, second);
        assert_eq!(second.latest_valid_hash, Some(child.hash()));
    }

    #[tokio::test]
    async fn mutated_field_yields_invalid_block_hash() {
        let ctx = setup();
        let child = block_with_parent(ctx.genesis.hash(), 1).seal_slow();

        let ExecutionPayload::V1(mut payload) = ExecutionPayload::from(child) else {
            panic!("expected a V1 payload")
        };
        payload.gas_used += 1;

        let status = ctx.service.new_payload(ExecutionPayload::V1(payload)).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::InvalidBlockHash { .. });
        assert_eq!(status.latest_valid_hash, Some(ctx.genesis.hash()));
    }

    #[tokio::test]
    async fn undecodable_transaction_yields_invalid() {
        let ctx = setup();
        let child = block_with_parent(ctx.genesis.hash(), 1).seal_slow();

        let ExecutionPayload::V1(mut payload) = ExecutionPayload::from(child) else {
            panic!("expected a V1 payload")
        };
        payload.transactions = vec![Bytes::from_static(&[0xde, 0xad])];

        let status = ctx.service.new_payload(ExecutionPayload::V1(payload)).await.unwrap();
        let PayloadStatusEnum::Invalid { validation_error } = status.status else {
            panic!("expected INVALID, got {}", status.status.as_str())
        };
        assert!(validation_error.unwrap().contains("index 0"));
        assert_eq!(status.latest_valid_hash, Some(ctx.genesis.hash()));
    }

    #[tokio::test]
    async fn unknown_parent_is_accepted_and_cached() {
        let ctx = setup();
        let orphan = block_with_parent(B256::with_last_byte(0x77), 5).seal_slow();

        let status = ctx.service.new_payload(orphan.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Accepted);
        assert_eq!(status.latest_valid_hash, None);

        // the cached block resolves as a head but its parent state is still missing
        let updated =
            ctx.service.fork_choice_updated(fcu_head(orphan.hash()), None).await.unwrap();
        assert!(updated.is_syncing());
    }

    #[tokio::test]
    async fn unknown_parent_is_syncing_when_skeleton_links() {
        let ctx = setup();
        // any forkchoice update lazily activates beacon sync
        let _ = ctx.service.fork_choice_updated(fcu_head(B256::with_last_byte(0x01)), None).await;
        ctx.service.sync.set_linkable(true);

        let orphan = block_with_parent(B256::with_last_byte(0x77), 5).seal_slow();
        let status = ctx.service.new_payload(orphan.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Syncing);
        assert_eq!(ctx.service.sync.extended_with(), vec![orphan.hash()]);
    }

    #[tokio::test]
    async fn non_terminal_pow_parent_is_invalid() {
        let ctx = setup();
        let mut pow = block_with_parent(ctx.genesis.hash(), 1);
        pow.header.difficulty = U256::from(50u64);
        let pow = pow.seal_slow();
        ctx.chain.insert_block(pow.clone());
        ctx.execution.insert_state_root(pow.state_root);
        // both the parent and the grandparent stay below the threshold
        ctx.chain.insert_td(pow.hash(), U256::from(TTD - 10));
        ctx.chain.insert_td(ctx.genesis.hash(), U256::from(40u64));

        let child = block_with_parent(pow.hash(), 2).seal_slow();
        let status = ctx.service.new_payload(child.into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Invalid { validation_error: None });
        assert_eq!(status.latest_valid_hash, Some(B256::ZERO));
    }

    #[tokio::test]
    async fn terminal_pow_parent_is_accepted() {
        let ctx = setup();
        let mut pow = block_with_parent(ctx.genesis.hash(), 1);
        pow.header.difficulty = U256::from(110u64);
        let pow = pow.seal_slow();
        ctx.chain.insert_block(pow.clone());
        ctx.execution.insert_state_root(pow.state_root);
        ctx.chain.insert_td(pow.hash(), U256::from(TTD + 50));
        ctx.chain.insert_td(ctx.genesis.hash(), U256::from(40u64));

        let child = block_with_parent(pow.hash(), 2).seal_slow();
        let status = ctx.service.new_payload(child.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);
        assert_eq!(status.latest_valid_hash, Some(child.hash()));
    }

    #[tokio::test]
    async fn disconnected_executed_parent_is_syncing() {
        let ctx = setup();
        // parent is stashed while its own ancestry is unknown, then its state arrives out of
        // band; nothing links the branch back to the canonical chain
        let parent = block_with_parent(B256::with_last_byte(0x55), 7).seal_slow();
        let stashed = ctx.service.new_payload(parent.clone().into()).await.unwrap();
        assert_matches!(stashed.status, PayloadStatusEnum::Accepted);
        ctx.execution.insert_state_root(parent.state_root);

        let child = block_with_parent(parent.hash(), 8).seal_slow();
        let status = ctx.service.new_payload(child.into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Syncing);
    }

    #[tokio::test]
    async fn payload_on_an_executed_side_branch_is_valid() {
        let ctx = setup();
        // the canonical chain moves to a while a competing branch grows from genesis
        let a = block_with_parent(ctx.genesis.hash(), 1).seal_slow();
        ctx.chain.extend_canonical(a.clone());
        ctx.execution.insert_state_root(a.state_root);

        let mut b = block_with_parent(ctx.genesis.hash(), 1);
        b.header.extra_data = Bytes::from_static(b"fork");
        b.header.state_root = B256::with_last_byte(0xbb);
        let b = b.seal_slow();
        let status = ctx.service.new_payload(b.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);

        // the next payload extends the side branch, not the canonical head
        let mut c = block_with_parent(b.hash(), 2);
        c.header.state_root = B256::with_last_byte(0xcc);
        let c = c.seal_slow();
        let status = ctx.service.new_payload(c.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);
        assert_eq!(status.latest_valid_hash, Some(c.hash()));
        assert!(ctx.execution.executed_blocks().contains(&c.hash()));
    }

    #[tokio::test]
    async fn execution_failure_yields_invalid() {
        let ctx = setup();
        let child = block_with_parent(ctx.genesis.hash(), 1).seal_slow();
        ctx.execution.fail_block(child.hash(), "gas mismatch");

        let status = ctx.service.new_payload(child.into()).await.unwrap();
        let PayloadStatusEnum::Invalid { validation_error } = status.status else {
            panic!("expected INVALID, got {}", status.status.as_str())
        };
        assert!(validation_error.unwrap().contains("gas mismatch"));
        assert_eq!(status.latest_valid_hash, Some(ctx.genesis.hash()));
    }
}

mod fork_choice {
    use super::*;

    #[tokio::test]
    async fn unknown_head_is_syncing() {
        let ctx = setup();
        let updated = ctx
            .service
            .fork_choice_updated(fcu_head(B256::with_last_byte(0xaa)), None)
            .await
            .unwrap();
        assert!(updated.is_syncing());
        assert!(updated.payload_id.is_none());
    }

    #[tokio::test]
    async fn promoting_a_new_head_reorgs_and_drains_the_pool() {
        let ctx = setup();
        let tx = signed_tx(0, 21_000, 100);
        let tx_hash = *tx.tx_hash();
        ctx.pool.add_transaction(tx.clone());

        let mut child = block_with_parent(ctx.genesis.hash(), 1);
        child.body = vec![strip_blob_sidecar(tx)];
        child.header.gas_used = 21_000;
        child.header.transactions_root = proofs::calculate_transaction_root(&child.body);
        let child = child.seal_slow();

        let status = ctx.service.new_payload(child.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);

        let updated =
            ctx.service.fork_choice_updated(fcu_head(child.hash()), None).await.unwrap();
        assert_matches!(updated.payload_status.status, PayloadStatusEnum::Valid);
        assert_eq!(updated.payload_status.latest_valid_hash, Some(child.hash()));

        assert_eq!(ctx.execution.set_head_batches(), vec![vec![child.hash()]]);
        assert_eq!(ctx.execution.canonical_head(), Some(child.hash()));
        assert_eq!(ctx.pool.removed_hashes(), vec![tx_hash]);
        // head timestamp is far in the past, so the node is not synchronized yet and the pool
        // is not told otherwise
        assert!(ctx.pool.run_state_updates().is_empty());
        assert!(!ctx.service.is_synchronized().await);
    }

    #[tokio::test]
    async fn reorgs_to_an_executed_sibling_head() {
        let ctx = setup();
        // a is the canonical head; b competes for the same height
        let a = block_with_parent(ctx.genesis.hash(), 1).seal_slow();
        ctx.chain.extend_canonical(a.clone());
        ctx.execution.insert_state_root(a.state_root);

        let mut b = block_with_parent(ctx.genesis.hash(), 1);
        b.header.extra_data = Bytes::from_static(b"fork");
        b.header.state_root = B256::with_last_byte(0xbb);
        let b = b.seal_slow();
        let status = ctx.service.new_payload(b.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);

        let updated = ctx.service.fork_choice_updated(fcu_head(b.hash()), None).await.unwrap();
        assert_matches!(updated.payload_status.status, PayloadStatusEnum::Valid);
        assert_eq!(updated.payload_status.latest_valid_hash, Some(b.hash()));
        assert_eq!(ctx.execution.set_head_batches(), vec![vec![b.hash()]]);
        assert_eq!(ctx.execution.canonical_head(), Some(b.hash()));
    }

    #[tokio::test]
    async fn synchronized_flips_once_and_survives_stale_heads() {
        let ctx = setup();
        let mut a = block_with_parent(ctx.genesis.hash(), 1);
        a.header.timestamp = crate::service::unix_now();
        let a = a.seal_slow();
        ctx.service.new_payload(a.clone().into()).await.unwrap();
        ctx.service.fork_choice_updated(fcu_head(a.hash()), None).await.unwrap();
        assert!(ctx.service.is_synchronized().await);
        assert_eq!(ctx.pool.run_state_updates(), vec![true]);
        // mirror the promotion in canonical storage
        ctx.chain.extend_canonical(a.clone());

        // a recent sibling at the same height stays below the sync target
        let mut sibling = block_with_parent(ctx.genesis.hash(), 1);
        sibling.header.timestamp = crate::service::unix_now();
        sibling.header.extra_data = Bytes::from_static(b"fork");
        sibling.header.state_root = B256::with_last_byte(0xbb);
        let sibling = sibling.seal_slow();
        ctx.service.new_payload(sibling.clone().into()).await.unwrap();
        ctx.service.fork_choice_updated(fcu_head(sibling.hash()), None).await.unwrap();
        assert_eq!(ctx.pool.run_state_updates(), vec![true]);

        // a stale head further out is promoted but does not clear the flag
        let stale = block_with_parent(a.hash(), 2).seal_slow();
        ctx.service.new_payload(stale.clone().into()).await.unwrap();
        let updated =
            ctx.service.fork_choice_updated(fcu_head(stale.hash()), None).await.unwrap();
        assert_matches!(updated.payload_status.status, PayloadStatusEnum::Valid);
        assert_eq!(ctx.execution.canonical_head(), Some(stale.hash()));
        assert!(ctx.service.is_synchronized().await);
        assert_eq!(ctx.pool.run_state_updates(), vec![true]);
    }

    #[tokio::test]
    async fn recent_head_marks_the_node_synchronized() {
        let ctx = setup();
        let mut child = block_with_parent(ctx.genesis.hash(), 1);
        child.header.timestamp = crate::service::unix_now();
        let child = child.seal_slow();

        let status = ctx.service.new_payload(child.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);
        ctx.service.fork_choice_updated(fcu_head(child.hash()), None).await.unwrap();

        assert!(ctx.service.is_synchronized().await);
        assert_eq!(ctx.pool.run_state_updates(), vec![true]);
    }

    #[tokio::test]
    async fn non_terminal_pow_head_is_invalid() {
        let ctx = setup();
        let mut pow = block_with_parent(ctx.genesis.hash(), 1);
        pow.header.difficulty = U256::from(50u64);
        let pow = pow.seal_slow();
        ctx.chain.insert_block(pow.clone());
        ctx.execution.insert_state_root(pow.state_root);
        ctx.chain.insert_td(pow.hash(), U256::from(TTD - 10));
        ctx.chain.insert_td(ctx.genesis.hash(), U256::from(40u64));

        let updated = ctx.service.fork_choice_updated(fcu_head(pow.hash()), None).await.unwrap();
        assert_matches!(
            updated.payload_status.status,
            PayloadStatusEnum::Invalid { validation_error: None }
        );
        assert_eq!(updated.payload_status.latest_valid_hash, Some(B256::ZERO));
    }

    #[tokio::test]
    async fn unresolvable_safe_and_finalized_hashes_are_param_errors() {
        let ctx = setup();

        let state = ForkchoiceState {
            head_block_hash: ctx.genesis.hash(),
            safe_block_hash: B256::with_last_byte(0x0f),
            finalized_block_hash: B256::ZERO,
        };
        let err = ctx.service.fork_choice_updated(state, None).await.unwrap_err();
        assert_eq!(err.to_string(), "safe block not available");

        let state = ForkchoiceState {
            head_block_hash: ctx.genesis.hash(),
            safe_block_hash: B256::ZERO,
            finalized_block_hash: B256::with_last_byte(0x0f),
        };
        let err = ctx.service.fork_choice_updated(state, None).await.unwrap_err();
        assert_eq!(err.to_string(), "finalized block not available");
    }

    #[tokio::test]
    async fn stale_attributes_timestamp_is_a_param_error() {
        let ctx = setup();
        let mut attrs = attrs_on(&ctx.genesis);
        attrs.timestamp = ctx.genesis.timestamp;

        let err = ctx
            .service
            .fork_choice_updated(fcu_head(ctx.genesis.hash()), Some(attrs))
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::InvalidParams(_));
    }

    #[tokio::test]
    async fn head_announced_to_active_skeleton() {
        let ctx = setup();
        // first update activates sync, second one announces the resolved head
        let _ = ctx.service.fork_choice_updated(fcu_head(B256::with_last_byte(1)), None).await;
        ctx.service.fork_choice_updated(fcu_head(ctx.genesis.hash()), None).await.unwrap();
        assert_eq!(ctx.service.sync.announced_heads(), vec![ctx.genesis.hash()]);
    }
}

mod payload_lifecycle {
    use super::*;

    #[tokio::test]
    async fn build_and_retrieve_a_payload_end_to_end() {
        let ctx = setup();
        for nonce in 0..3 {
            ctx.pool.add_transaction(signed_tx(nonce, 21_000, 100 - nonce as u128));
        }
        let attrs = attrs_on(&ctx.genesis);
        let fee_recipient = attrs.suggested_fee_recipient;

        let updated = ctx
            .service
            .fork_choice_updated(fcu_head(ctx.genesis.hash()), Some(attrs))
            .await
            .unwrap();
        assert_matches!(updated.payload_status.status, PayloadStatusEnum::Valid);
        let id = updated.payload_id.unwrap();

        let built = ctx.service.get_payload(id).await.unwrap();
        assert_eq!(built.block.number, ctx.genesis.number + 1);
        assert_eq!(built.block.body.len(), 3);
        assert_eq!(built.block.beneficiary, fee_recipient);
        assert_eq!(
            built.block.state_root,
            derive_state_root(ctx.genesis.state_root, ctx.genesis.number + 1)
        );
        // the finalized block was persisted without moving the canonical head
        assert!(ctx.execution.executed_blocks().contains(&built.block.hash()));
        assert_eq!(ctx.execution.canonical_head(), None);

        assert_matches!(
            ctx.service.get_payload(id).await.unwrap_err(),
            EngineError::UnknownPayload
        );
    }

    #[tokio::test]
    async fn reorg_does_not_duplicate_mined_txs_in_a_pending_build() {
        let ctx = setup();
        let tx = signed_tx(0, 21_000, 100);
        let tx_hash = *tx.tx_hash();
        ctx.pool.add_transaction(tx.clone());

        // the build on top of genesis picks the transaction up right away
        let updated = ctx
            .service
            .fork_choice_updated(fcu_head(ctx.genesis.hash()), Some(attrs_on(&ctx.genesis)))
            .await
            .unwrap();
        let id = updated.payload_id.unwrap();

        // meanwhile a competing block mines the same transaction and becomes the head
        let mut mined = block_with_parent(ctx.genesis.hash(), 1);
        mined.body = vec![strip_blob_sidecar(tx)];
        mined.header.gas_used = 21_000;
        mined.header.transactions_root = proofs::calculate_transaction_root(&mined.body);
        let mined = mined.seal_slow();
        let status = ctx.service.new_payload(mined.clone().into()).await.unwrap();
        assert_matches!(status.status, PayloadStatusEnum::Valid);
        ctx.service.fork_choice_updated(fcu_head(mined.hash()), None).await.unwrap();
        assert_eq!(ctx.pool.removed_hashes(), vec![tx_hash]);

        // the in-flight build is untouched by the reorg and the top-up adds nothing
        let built = ctx.service.get_payload(id).await.unwrap();
        assert_eq!(built.block.parent_hash, ctx.genesis.hash());
        assert_eq!(built.block.body.len(), 1);
        assert_eq!(*built.block.body[0].tx_hash(), tx_hash);
    }

    #[tokio::test]
    async fn unknown_payload_id_is_an_error() {
        let ctx = setup();
        let id = PayloadId::new([0xab; 8]);
        assert_matches!(ctx.service.get_payload(id).await.unwrap_err(), EngineError::UnknownPayload);
        assert_matches!(
            ctx.service.blobs_bundle(id).await.unwrap_err(),
            EngineError::UnknownPayload
        );
    }

    #[tokio::test]
    async fn stopped_payload_releases_its_builder() {
        let ctx = setup();
        let updated = ctx
            .service
            .fork_choice_updated(fcu_head(ctx.genesis.hash()), Some(attrs_on(&ctx.genesis)))
            .await
            .unwrap();
        let id = updated.payload_id.unwrap();

        ctx.service.stop_payload(id).await.unwrap();
        assert_eq!(ctx.execution.reverted_builders(), 1);
        assert_matches!(ctx.service.get_payload(id).await.unwrap_err(), EngineError::UnknownPayload);
    }

    #[tokio::test]
    async fn blobs_bundle_is_single_use() {
        let ctx = setup_with_spec(ChainSpec { cancun_time: Some(0), ..test_spec() });
        ctx.pool.add_transaction(blob_tx(0, 2));

        let updated = ctx
            .service
            .fork_choice_updated(fcu_head(ctx.genesis.hash()), Some(attrs_on(&ctx.genesis)))
            .await
            .unwrap();
        let id = updated.payload_id.unwrap();
        let built = ctx.service.get_payload(id).await.unwrap();

        let bundle = ctx.service.blobs_bundle(id).await.unwrap();
        assert_eq!(bundle.blobs.len(), 2);
        assert_eq!(bundle.block_hash, built.block.hash());
        assert_matches!(
            ctx.service.blobs_bundle(id).await.unwrap_err(),
            EngineError::UnknownPayload
        );
    }
}

mod transition {
    use super::*;

    #[tokio::test]
    async fn matching_configuration_echoes_the_terminal_block() {
        let ctx = setup();
        let config = TransitionConfiguration {
            terminal_total_difficulty: U256::from(TTD),
            terminal_block_hash: B256::with_last_byte(0x01),
            terminal_block_number: 42,
        };
        let echoed = ctx.service.exchange_transition_configuration(config.clone()).unwrap();
        assert_eq!(echoed, config);
    }

    #[tokio::test]
    async fn mismatched_total_difficulty_is_a_param_error() {
        let ctx = setup();
        let config = TransitionConfiguration {
            terminal_total_difficulty: U256::from(TTD + 1),
            ..Default::default()
        };
        assert_matches!(
            ctx.service.exchange_transition_configuration(config).unwrap_err(),
            EngineError::InvalidParams(_)
        );
    }
}
