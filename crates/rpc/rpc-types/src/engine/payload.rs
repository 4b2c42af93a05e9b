use alloy_eips::eip2718::{Decodable2718, Eip2718Error, Encodable2718};
use alloy_primitives::{Address, Bloom, Bytes, B256, B64, U256};
use opal_primitives::{proofs, Block, Header, SealedBlock, TransactionSigned, Withdrawal};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use std::fmt;

/// An 8-byte identifier for an in-flight block-building session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PayloadId(B64);

impl PayloadId {
    /// Creates a new payload id from the given bytes.
    pub fn new(id: [u8; 8]) -> Self {
        Self(B64::from(id))
    }

    /// Returns the raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0 .0
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The execution payload body as introduced with the proof-of-stake transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadV1 {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// The address the block rewards are sent to.
    pub fee_recipient: Address,
    /// The state root of the block.
    pub state_root: B256,
    /// The receipts root of the block.
    pub receipts_root: B256,
    /// The logs bloom of the block.
    pub logs_bloom: Bloom,
    /// The output of the randomness beacon (`mixHash`).
    pub prev_randao: B256,
    /// The block number.
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    /// The gas limit of the block.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_limit: u64,
    /// The gas used by the block.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    /// The timestamp of the block.
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    /// The extra data of the block.
    pub extra_data: Bytes,
    /// The base fee per gas of the block.
    pub base_fee_per_gas: U256,
    /// The hash of the block.
    pub block_hash: B256,
    /// The transactions of the block, each in its EIP-2718 envelope encoding.
    pub transactions: Vec<Bytes>,
}

/// The execution payload with withdrawals (Shanghai).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadV2 {
    /// Inner V1 payload.
    #[serde(flatten)]
    pub payload_inner: ExecutionPayloadV1,
    /// Array of withdrawals.
    pub withdrawals: Vec<Withdrawal>,
}

/// The execution payload with a blob fee market (early Cancun devnets): V2 plus the excess
/// data gas accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadV3 {
    /// Inner V2 payload.
    #[serde(flatten)]
    pub payload_inner: ExecutionPayloadV2,
    /// The excess data gas accumulated prior to this block.
    pub excess_data_gas: U256,
}

/// An execution payload of any supported version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionPayload {
    /// V3 payload
    V3(ExecutionPayloadV3),
    /// V2 payload
    V2(ExecutionPayloadV2),
    /// V1 payload
    V1(ExecutionPayloadV1),
}

impl ExecutionPayload {
    /// Returns a reference to the inner V1 payload.
    pub fn as_v1(&self) -> &ExecutionPayloadV1 {
        match self {
            Self::V1(payload) => payload,
            Self::V2(payload) => &payload.payload_inner,
            Self::V3(payload) => &payload.payload_inner.payload_inner,
        }
    }

    /// Returns the parent hash of the payload.
    pub fn parent_hash(&self) -> B256 {
        self.as_v1().parent_hash
    }

    /// Returns the block hash declared by the payload.
    pub fn block_hash(&self) -> B256 {
        self.as_v1().block_hash
    }

    /// Returns the block number of the payload.
    pub fn block_number(&self) -> u64 {
        self.as_v1().block_number
    }

    /// Returns the timestamp of the payload.
    pub fn timestamp(&self) -> u64 {
        self.as_v1().timestamp
    }

    /// Returns the withdrawals of the payload, if any.
    pub fn withdrawals(&self) -> Option<&Vec<Withdrawal>> {
        match self {
            Self::V1(_) => None,
            Self::V2(payload) => Some(&payload.withdrawals),
            Self::V3(payload) => Some(&payload.payload_inner.withdrawals),
        }
    }

    /// Returns the excess data gas of the payload, if any.
    pub fn excess_data_gas(&self) -> Option<U256> {
        match self {
            Self::V3(payload) => Some(payload.excess_data_gas),
            _ => None,
        }
    }

    /// Converts the payload into a sealed block, verifying that the recomputed header hash
    /// matches the declared `blockHash`.
    pub fn try_into_sealed_block(self) -> Result<SealedBlock, PayloadError> {
        let expected_hash = self.block_hash();
        let block: Block = self.try_into()?;
        let sealed = block.seal_slow();
        if sealed.hash() != expected_hash {
            return Err(PayloadError::BlockHash {
                execution: sealed.hash(),
                consensus: expected_hash,
            })
        }
        Ok(sealed)
    }
}

impl From<ExecutionPayloadV1> for ExecutionPayload {
    fn from(payload: ExecutionPayloadV1) -> Self {
        Self::V1(payload)
    }
}

impl From<ExecutionPayloadV2> for ExecutionPayload {
    fn from(payload: ExecutionPayloadV2) -> Self {
        Self::V2(payload)
    }
}

impl From<ExecutionPayloadV3> for ExecutionPayload {
    fn from(payload: ExecutionPayloadV3) -> Self {
        Self::V3(payload)
    }
}

impl From<SealedBlock> for ExecutionPayloadV1 {
    fn from(block: SealedBlock) -> Self {
        let transactions =
            block.body.iter().map(|tx| tx.encoded_2718().into()).collect::<Vec<Bytes>>();
        Self {
            parent_hash: block.parent_hash,
            fee_recipient: block.beneficiary,
            state_root: block.state_root,
            receipts_root: block.receipts_root,
            logs_bloom: block.logs_bloom,
            prev_randao: block.mix_hash,
            block_number: block.number,
            gas_limit: block.gas_limit,
            gas_used: block.gas_used,
            timestamp: block.timestamp,
            extra_data: block.extra_data.clone(),
            base_fee_per_gas: U256::from(block.base_fee_per_gas.unwrap_or_default()),
            block_hash: block.hash(),
            transactions,
        }
    }
}

impl From<SealedBlock> for ExecutionPayloadV2 {
    fn from(mut block: SealedBlock) -> Self {
        let withdrawals = block.withdrawals.take().unwrap_or_default();
        Self { payload_inner: block.into(), withdrawals }
    }
}

impl From<SealedBlock> for ExecutionPayloadV3 {
    fn from(block: SealedBlock) -> Self {
        let excess_data_gas = U256::from(block.excess_data_gas.unwrap_or_default());
        Self { payload_inner: block.into(), excess_data_gas }
    }
}

impl From<SealedBlock> for ExecutionPayload {
    fn from(block: SealedBlock) -> Self {
        if block.excess_data_gas.is_some() {
            Self::V3(block.into())
        } else if block.withdrawals.is_some() {
            Self::V2(block.into())
        } else {
            Self::V1(block.into())
        }
    }
}

impl TryFrom<ExecutionPayloadV1> for Block {
    type Error = PayloadError;

    fn try_from(payload: ExecutionPayloadV1) -> Result<Self, Self::Error> {
        if payload.extra_data.len() > 32 {
            return Err(PayloadError::ExtraData(payload.extra_data))
        }
        let base_fee_per_gas = u64::try_from(payload.base_fee_per_gas)
            .map_err(|_| PayloadError::BaseFee(payload.base_fee_per_gas))?;

        let mut transactions = Vec::with_capacity(payload.transactions.len());
        for (index, tx) in payload.transactions.iter().enumerate() {
            let tx = TransactionSigned::decode_2718(&mut tx.as_ref())
                .map_err(|error| PayloadError::InvalidTransaction { index, error })?;
            transactions.push(tx);
        }
        let transactions_root = proofs::calculate_transaction_root(&transactions);

        let header = Header {
            parent_hash: payload.parent_hash,
            beneficiary: payload.fee_recipient,
            state_root: payload.state_root,
            transactions_root,
            receipts_root: payload.receipts_root,
            logs_bloom: payload.logs_bloom,
            number: payload.block_number,
            gas_limit: payload.gas_limit,
            gas_used: payload.gas_used,
            timestamp: payload.timestamp,
            mix_hash: payload.prev_randao,
            base_fee_per_gas: Some(base_fee_per_gas),
            extra_data: payload.extra_data,
            ..Default::default()
        };

        Ok(Block { header, body: transactions, ommers: Vec::new(), withdrawals: None })
    }
}

impl TryFrom<ExecutionPayloadV2> for Block {
    type Error = PayloadError;

    fn try_from(payload: ExecutionPayloadV2) -> Result<Self, Self::Error> {
        let mut block: Block = payload.payload_inner.try_into()?;
        block.header.withdrawals_root =
            Some(proofs::calculate_withdrawals_root(&payload.withdrawals));
        block.withdrawals = Some(payload.withdrawals);
        Ok(block)
    }
}

impl TryFrom<ExecutionPayloadV3> for Block {
    type Error = PayloadError;

    fn try_from(payload: ExecutionPayloadV3) -> Result<Self, Self::Error> {
        let excess_data_gas = u64::try_from(payload.excess_data_gas)
            .map_err(|_| PayloadError::ExcessDataGas(payload.excess_data_gas))?;
        let mut block: Block = payload.payload_inner.try_into()?;
        block.header.excess_data_gas = Some(excess_data_gas);
        Ok(block)
    }
}

impl TryFrom<ExecutionPayload> for Block {
    type Error = PayloadError;

    fn try_from(payload: ExecutionPayload) -> Result<Self, Self::Error> {
        match payload {
            ExecutionPayload::V1(payload) => payload.try_into(),
            ExecutionPayload::V2(payload) => payload.try_into(),
            ExecutionPayload::V3(payload) => payload.try_into(),
        }
    }
}

/// The response shape of `engine_getPayloadV2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadEnvelopeV2 {
    /// The built execution payload; carries withdrawals when the block has them.
    pub execution_payload: ExecutionPayload,
    /// The expected value the block yields to its fee recipient.
    pub block_value: U256,
}

/// The response shape of `engine_getPayloadV3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadEnvelopeV3 {
    /// The built execution payload.
    pub execution_payload: ExecutionPayloadV3,
    /// The expected value the block yields to its fee recipient.
    pub block_value: U256,
}

/// Error that can occur when handling payloads.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Invalid payload extra data.
    #[error("invalid payload extra data: {0}")]
    ExtraData(Bytes),
    /// Invalid payload base fee.
    #[error("invalid payload base fee: {0}")]
    BaseFee(U256),
    /// Invalid payload excess data gas.
    #[error("invalid payload excess data gas: {0}")]
    ExcessDataGas(U256),
    /// A transaction in the payload could not be decoded.
    #[error("invalid transaction at index {index}: {error}")]
    InvalidTransaction {
        /// Position of the failing transaction in the payload.
        index: usize,
        /// The decoding failure.
        #[source]
        error: Eip2718Error,
    },
    /// The recomputed block hash does not match the one declared by the payload.
    #[error("block hash mismatch: want {consensus}, got {execution}")]
    BlockHash {
        /// The block hash computed from the payload.
        execution: B256,
        /// The block hash declared by the payload.
        consensus: B256,
    },
}

impl PayloadError {
    /// Returns `true` for the declared-hash mismatch, which yields `INVALID_BLOCK_HASH` rather
    /// than `INVALID`.
    pub fn is_block_hash_mismatch(&self) -> bool {
        matches!(self, Self::BlockHash { .. })
    }
}

/// The status of a payload as answered on the payload-status channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadStatus {
    /// The status of the payload.
    #[serde(flatten)]
    pub status: PayloadStatusEnum,
    /// Hash of the most recent valid block in the branch defined by payload and its ancestors.
    #[serde(rename = "latestValidHash")]
    pub latest_valid_hash: Option<B256>,
}

impl PayloadStatus {
    /// Creates a new payload status.
    pub fn new(status: PayloadStatusEnum, latest_valid_hash: Option<B256>) -> Self {
        Self { status, latest_valid_hash }
    }

    /// Creates a new payload status without a latest valid hash.
    pub fn from_status(status: PayloadStatusEnum) -> Self {
        Self { status, latest_valid_hash: None }
    }

    /// Sets the latest valid hash.
    pub fn with_latest_valid_hash(mut self, latest_valid_hash: B256) -> Self {
        self.latest_valid_hash = Some(latest_valid_hash);
        self
    }
}

impl Serialize for PayloadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // All three keys are always present on the wire, null standing in for absent values.
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("status", self.status.as_str())?;
        map.serialize_entry("latestValidHash", &self.latest_valid_hash)?;
        map.serialize_entry("validationError", &self.status.validation_error())?;
        map.end()
    }
}

/// The five payload statuses of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadStatusEnum {
    /// The payload extends the canonical chain and was fully validated.
    Valid,
    /// The payload or its chain is invalid.
    Invalid {
        /// What invalidated the payload, if anything printable. A terminal-block violation
        /// carries no message.
        #[serde(rename = "validationError")]
        validation_error: Option<String>,
    },
    /// The declared block hash does not match the payload contents.
    InvalidBlockHash {
        /// The hash mismatch description.
        #[serde(rename = "validationError")]
        validation_error: String,
    },
    /// The payload looks plausible but cannot be validated yet; do not build on it.
    Accepted,
    /// Execution has not caught up to the payload's parent.
    Syncing,
}

impl PayloadStatusEnum {
    /// Returns the wire string of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid { .. } => "INVALID",
            Self::InvalidBlockHash { .. } => "INVALID_BLOCK_HASH",
            Self::Accepted => "ACCEPTED",
            Self::Syncing => "SYNCING",
        }
    }

    /// Returns the validation error carried by the status, if any.
    pub fn validation_error(&self) -> Option<&str> {
        match self {
            Self::Invalid { validation_error } => validation_error.as_deref(),
            Self::InvalidBlockHash { validation_error } => Some(validation_error),
            _ => None,
        }
    }

    /// Returns `true` if the status is `VALID`.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns `true` if the status is `SYNCING`.
    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::Syncing)
    }
}

impl From<PayloadError> for PayloadStatusEnum {
    fn from(error: PayloadError) -> Self {
        if error.is_block_hash_mismatch() {
            Self::InvalidBlockHash { validation_error: error.to_string() }
        } else {
            Self::Invalid { validation_error: Some(error.to_string()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{SignableTransaction, TxLegacy};
    use alloy_primitives::{Signature, TxKind};

    fn payload_v1() -> ExecutionPayloadV1 {
        ExecutionPayloadV1 {
            parent_hash: B256::with_last_byte(1),
            fee_recipient: Address::with_last_byte(2),
            state_root: B256::with_last_byte(3),
            receipts_root: B256::with_last_byte(4),
            prev_randao: B256::with_last_byte(5),
            block_number: 6,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_690_000_000,
            base_fee_per_gas: U256::from(7u64),
            block_hash: B256::with_last_byte(8),
            ..Default::default()
        }
    }

    #[test]
    fn payload_id_serde() {
        let id = PayloadId::new([0, 1, 2, 3, 4, 5, 6, 7]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""0x0001020304050607""#);
        assert_eq!(serde_json::from_str::<PayloadId>(&json).unwrap(), id);
    }

    #[test]
    fn payload_versions_roundtrip_and_flatten() {
        let v1 = payload_v1();
        let json = serde_json::to_value(&v1).unwrap();
        assert_eq!(json["blockNumber"], "0x6");
        assert!(json.get("withdrawals").is_none());

        let v2 = ExecutionPayloadV2 { payload_inner: v1.clone(), withdrawals: vec![] };
        let json = serde_json::to_value(&v2).unwrap();
        assert_eq!(json["parentHash"], serde_json::to_value(v1.parent_hash).unwrap());
        assert!(json.get("withdrawals").is_some());
        assert!(json.get("excessDataGas").is_none());

        let v3 = ExecutionPayloadV3 { payload_inner: v2.clone(), excess_data_gas: U256::ZERO };
        let json = serde_json::to_string(&v3).unwrap();
        assert!(json.contains(r#""excessDataGas":"0x0""#));
        assert_eq!(serde_json::from_str::<ExecutionPayloadV3>(&json).unwrap(), v3);

        // the untagged enum picks the richest matching variant
        let payload: ExecutionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, ExecutionPayload::V3(v3));
        let payload: ExecutionPayload =
            serde_json::from_str(&serde_json::to_string(&v2).unwrap()).unwrap();
        assert_eq!(payload, ExecutionPayload::V2(v2));
    }

    #[test]
    fn payload_status_always_serializes_three_keys() {
        let status = PayloadStatus::from_status(PayloadStatusEnum::Syncing);
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"status":"SYNCING","latestValidHash":null,"validationError":null}"#
        );

        let status = PayloadStatus::new(
            PayloadStatusEnum::Invalid { validation_error: None },
            Some(B256::ZERO),
        );
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""status":"INVALID""#));
        assert!(json.contains(r#""validationError":null"#));

        let status = PayloadStatus::from_status(PayloadStatusEnum::InvalidBlockHash {
            validation_error: "block hash mismatch".to_string(),
        });
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""status":"INVALID_BLOCK_HASH""#));
        assert!(json.contains(r#""validationError":"block hash mismatch""#));
    }

    #[test]
    fn payload_to_block_rejects_bad_transaction_with_index() {
        let mut payload = payload_v1();
        payload.transactions = vec![Bytes::from_static(&[0x01, 0x02])];
        let err = Block::try_from(payload).unwrap_err();
        assert!(err.to_string().starts_with("invalid transaction at index 0"));
    }

    #[test]
    fn payload_to_block_rejects_oversized_extra_data() {
        let mut payload = payload_v1();
        payload.extra_data = Bytes::from(vec![0u8; 33]);
        assert!(matches!(Block::try_from(payload).unwrap_err(), PayloadError::ExtraData(_)));
    }

    #[test]
    fn payload_to_block_rejects_oversized_base_fee() {
        let mut payload = payload_v1();
        payload.base_fee_per_gas = U256::MAX;
        assert!(matches!(Block::try_from(payload).unwrap_err(), PayloadError::BaseFee(_)));
    }

    #[test]
    fn sealed_block_to_payload_and_back() {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 10,
            gas_limit: 21_000,
            to: TxKind::Call(Address::with_last_byte(9)),
            value: U256::from(1u64),
            input: Bytes::new(),
        };
        let signature = Signature::new(U256::from(1u64), U256::from(2u64), false);
        let tx = TransactionSigned::Legacy(tx.into_signed(signature));

        let block = Block {
            header: Header {
                number: 10,
                gas_limit: 30_000_000,
                gas_used: 21_000,
                base_fee_per_gas: Some(7),
                transactions_root: proofs::calculate_transaction_root(&[tx.clone()]),
                ..Default::default()
            },
            body: vec![tx],
            ommers: Vec::new(),
            withdrawals: None,
        };
        let sealed = block.seal_slow();

        let payload = ExecutionPayload::from(sealed.clone());
        assert!(matches!(payload, ExecutionPayload::V1(_)));
        let roundtripped = payload.try_into_sealed_block().unwrap();
        assert_eq!(roundtripped, sealed);
    }

    #[test]
    fn mismatched_block_hash_is_detected() {
        let sealed = Block {
            header: Header { number: 1, base_fee_per_gas: Some(7), ..Default::default() },
            ..Default::default()
        }
        .seal_slow();
        let mut payload = ExecutionPayloadV1::from(sealed);
        payload.block_hash = B256::with_last_byte(0xff);
        let err = ExecutionPayload::V1(payload).try_into_sealed_block().unwrap_err();
        assert!(err.is_block_hash_mismatch());
    }
}
