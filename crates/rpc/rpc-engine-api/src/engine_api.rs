use crate::{EngineApiError, EngineApiResult};
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;
use opal_engine::EngineService;
use opal_interfaces::{BeaconSync, ChainProvider, Execution, TransactionPool};
use opal_primitives::ChainSpec;
use opal_rpc_api::EngineApiServer;
use opal_rpc_types::{
    BlobsBundleV1, ExecutionPayload, ExecutionPayloadEnvelopeV2, ExecutionPayloadEnvelopeV3,
    ExecutionPayloadV1, ForkchoiceState, ForkchoiceUpdated, PayloadAttributes, PayloadId,
    PayloadStatus, TransitionConfiguration,
};
use std::sync::Arc;
use tracing::trace;

/// The version of an engine namespace method, dictating which optional payload fields may
/// appear at which fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineApiMessageVersion {
    /// Paris methods: no withdrawals, no blob fields.
    V1,
    /// Shanghai methods: withdrawals, gated on the fork being active.
    V2,
    /// Blob-devnet methods: V2 plus `excessDataGas`.
    V3,
}

/// Server implementation of the engine namespace, delegating to an [`EngineService`] after
/// version gating the request shape.
pub struct EngineApi<C, E: Execution, P, S> {
    engine: Arc<EngineService<C, E, P, S>>,
    chain_spec: Arc<ChainSpec>,
}

impl<C, E, P, S> EngineApi<C, E, P, S>
where
    C: ChainProvider,
    E: Execution,
    P: TransactionPool,
    S: BeaconSync,
{
    /// Creates the API on top of an engine service.
    pub fn new(engine: Arc<EngineService<C, E, P, S>>, chain_spec: Arc<ChainSpec>) -> Self {
        Self { engine, chain_spec }
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/paris.md#engine_newpayloadv1>
    ///
    /// Caution: does not accept the `withdrawals` or `excessDataGas` fields.
    pub async fn new_payload_v1(
        &self,
        payload: ExecutionPayload,
    ) -> EngineApiResult<PayloadStatus> {
        self.validate_version_fields(EngineApiMessageVersion::V1, &payload)?;
        Ok(self.engine.new_payload(payload).await?)
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/shanghai.md#engine_newpayloadv2>
    pub async fn new_payload_v2(
        &self,
        payload: ExecutionPayload,
    ) -> EngineApiResult<PayloadStatus> {
        self.validate_version_fields(EngineApiMessageVersion::V2, &payload)?;
        Ok(self.engine.new_payload(payload).await?)
    }

    /// `engine_newPayloadV3` as shipped on the early blob devnets: requires the
    /// `excessDataGas` field on top of the V2 shape.
    pub async fn new_payload_v3(
        &self,
        payload: ExecutionPayload,
    ) -> EngineApiResult<PayloadStatus> {
        self.validate_version_fields(EngineApiMessageVersion::V3, &payload)?;
        Ok(self.engine.new_payload(payload).await?)
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/paris.md#engine_forkchoiceupdatedv1>
    ///
    /// Caution: the attributes must not carry the `withdrawals` field.
    pub async fn fork_choice_updated_v1(
        &self,
        state: ForkchoiceState,
        attrs: Option<PayloadAttributes>,
    ) -> EngineApiResult<ForkchoiceUpdated> {
        if let Some(attrs) = &attrs {
            self.validate_withdrawals_presence(
                EngineApiMessageVersion::V1,
                attrs.timestamp,
                attrs.withdrawals.is_some(),
            )?;
        }
        Ok(self.engine.fork_choice_updated(state, attrs).await?)
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/shanghai.md#engine_forkchoiceupdatedv2>
    pub async fn fork_choice_updated_v2(
        &self,
        state: ForkchoiceState,
        attrs: Option<PayloadAttributes>,
    ) -> EngineApiResult<ForkchoiceUpdated> {
        if let Some(attrs) = &attrs {
            self.validate_withdrawals_presence(
                EngineApiMessageVersion::V2,
                attrs.timestamp,
                attrs.withdrawals.is_some(),
            )?;
        }
        Ok(self.engine.fork_choice_updated(state, attrs).await?)
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/paris.md#engine_getpayloadv1>
    ///
    /// Caution: returns the bare V1 payload, without withdrawals or a block value.
    pub async fn get_payload_v1(&self, id: PayloadId) -> EngineApiResult<ExecutionPayload> {
        let built = self.engine.get_payload(id).await?;
        Ok(ExecutionPayloadV1::from(built.block).into())
    }

    /// See also <https://github.com/ethereum/execution-apis/blob/main/src/engine/shanghai.md#engine_getpayloadv2>
    pub async fn get_payload_v2(
        &self,
        id: PayloadId,
    ) -> EngineApiResult<ExecutionPayloadEnvelopeV2> {
        let built = self.engine.get_payload(id).await?;
        Ok(ExecutionPayloadEnvelopeV2 {
            execution_payload: built.block.into(),
            block_value: built.fees,
        })
    }

    /// `engine_getPayloadV3` as shipped on the early blob devnets.
    pub async fn get_payload_v3(
        &self,
        id: PayloadId,
    ) -> EngineApiResult<ExecutionPayloadEnvelopeV3> {
        let built = self.engine.get_payload(id).await?;
        Ok(ExecutionPayloadEnvelopeV3 {
            execution_payload: built.block.into(),
            block_value: built.fees,
        })
    }

    /// Cross-checks the configured merge transition parameters against the consensus layer's.
    pub fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> EngineApiResult<TransitionConfiguration> {
        Ok(self.engine.exchange_transition_configuration(config)?)
    }

    /// Hands out the blob sidecars of a built payload. Single use per id.
    pub async fn get_blobs_bundle_v1(&self, id: PayloadId) -> EngineApiResult<BlobsBundleV1> {
        let bundle = self.engine.blobs_bundle(id).await?;
        Ok(BlobsBundleV1 {
            block_hash: bundle.block_hash,
            kzgs: bundle.commitments,
            blobs: bundle.blobs,
        })
    }

    fn validate_version_fields(
        &self,
        version: EngineApiMessageVersion,
        payload: &ExecutionPayload,
    ) -> EngineApiResult<()> {
        let timestamp = payload.timestamp();
        self.validate_withdrawals_presence(version, timestamp, payload.withdrawals().is_some())?;
        self.validate_excess_data_gas_presence(
            version,
            timestamp,
            payload.excess_data_gas().is_some(),
        )
    }

    /// Validates the presence of the `withdrawals` field: forbidden in V1 and before Shanghai,
    /// required from V2 on once Shanghai is active at the timestamp.
    fn validate_withdrawals_presence(
        &self,
        version: EngineApiMessageVersion,
        timestamp: u64,
        has_withdrawals: bool,
    ) -> EngineApiResult<()> {
        let is_shanghai = self.chain_spec.is_shanghai_active_at_timestamp(timestamp);
        match version {
            EngineApiMessageVersion::V1 => {
                if has_withdrawals {
                    return Err(EngineApiError::WithdrawalsNotSupportedInV1)
                }
                if is_shanghai {
                    return Err(EngineApiError::NoWithdrawalsPostShanghai)
                }
            }
            EngineApiMessageVersion::V2 | EngineApiMessageVersion::V3 => {
                if is_shanghai && !has_withdrawals {
                    return Err(EngineApiError::NoWithdrawalsPostShanghai)
                }
                if !is_shanghai && has_withdrawals {
                    return Err(EngineApiError::HasWithdrawalsPreShanghai)
                }
            }
        }
        Ok(())
    }

    /// Validates the presence of the `excessDataGas` field: V3 only, and only once Cancun is
    /// active at the timestamp.
    fn validate_excess_data_gas_presence(
        &self,
        version: EngineApiMessageVersion,
        timestamp: u64,
        has_excess_data_gas: bool,
    ) -> EngineApiResult<()> {
        let is_cancun = self.chain_spec.is_cancun_active_at_timestamp(timestamp);
        match version {
            EngineApiMessageVersion::V1 | EngineApiMessageVersion::V2 => {
                if has_excess_data_gas {
                    return Err(EngineApiError::ExcessDataGasNotSupported)
                }
            }
            EngineApiMessageVersion::V3 => {
                if is_cancun && !has_excess_data_gas {
                    return Err(EngineApiError::NoExcessDataGasPostCancun)
                }
                if !is_cancun && has_excess_data_gas {
                    return Err(EngineApiError::HasExcessDataGasPreCancun)
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C, E, P, S> EngineApiServer for EngineApi<C, E, P, S>
where
    C: ChainProvider,
    E: Execution,
    P: TransactionPool,
    S: BeaconSync,
{
    async fn new_payload_v1(&self, payload: ExecutionPayload) -> RpcResult<PayloadStatus> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV1");
        Ok(Self::new_payload_v1(self, payload).await?)
    }

    async fn new_payload_v2(&self, payload: ExecutionPayload) -> RpcResult<PayloadStatus> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV2");
        Ok(Self::new_payload_v2(self, payload).await?)
    }

    async fn new_payload_v3(&self, payload: ExecutionPayload) -> RpcResult<PayloadStatus> {
        trace!(target: "rpc::engine", "Serving engine_newPayloadV3");
        Ok(Self::new_payload_v3(self, payload).await?)
    }

    async fn fork_choice_updated_v1(
        &self,
        fork_choice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated> {
        trace!(target: "rpc::engine", "Serving engine_forkchoiceUpdatedV1");
        Ok(Self::fork_choice_updated_v1(self, fork_choice_state, payload_attributes).await?)
    }

    async fn fork_choice_updated_v2(
        &self,
        fork_choice_state: ForkchoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated> {
        trace!(target: "rpc::engine", "Serving engine_forkchoiceUpdatedV2");
        Ok(Self::fork_choice_updated_v2(self, fork_choice_state, payload_attributes).await?)
    }

    async fn get_payload_v1(&self, payload_id: PayloadId) -> RpcResult<ExecutionPayload> {
        trace!(target: "rpc::engine", "Serving engine_getPayloadV1");
        Ok(Self::get_payload_v1(self, payload_id).await?)
    }

    async fn get_payload_v2(
        &self,
        payload_id: PayloadId,
    ) -> RpcResult<ExecutionPayloadEnvelopeV2> {
        trace!(target: "rpc::engine", "Serving engine_getPayloadV2");
        Ok(Self::get_payload_v2(self, payload_id).await?)
    }

    async fn get_payload_v3(
        &self,
        payload_id: PayloadId,
    ) -> RpcResult<ExecutionPayloadEnvelopeV3> {
        trace!(target: "rpc::engine", "Serving engine_getPayloadV3");
        Ok(Self::get_payload_v3(self, payload_id).await?)
    }

    async fn exchange_transition_configuration(
        &self,
        transition_configuration: TransitionConfiguration,
    ) -> RpcResult<TransitionConfiguration> {
        trace!(target: "rpc::engine", "Serving engine_exchangeTransitionConfigurationV1");
        Ok(Self::exchange_transition_configuration(self, transition_configuration)?)
    }

    async fn get_blobs_bundle_v1(&self, payload_id: PayloadId) -> RpcResult<BlobsBundleV1> {
        trace!(target: "rpc::engine", "Serving engine_getBlobsBundleV1");
        Ok(Self::get_blobs_bundle_v1(self, payload_id).await?)
    }
}
