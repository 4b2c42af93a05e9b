use alloy_eips::eip1559::BaseFeeParams;
use alloy_primitives::{b256, B256, U256};

/// The parameters that define a chain for the purposes of the engine layer: the proof-of-stake
/// transition threshold and the timestamp-scheduled forks that change payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    /// The chain id (EIP-155).
    pub chain_id: u64,
    /// The hash of the genesis block.
    pub genesis_hash: B256,
    /// The total difficulty at which the network transitions to proof of stake.
    pub terminal_total_difficulty: Option<U256>,
    /// Timestamp at which withdrawals (Shanghai) activate.
    pub shanghai_time: Option<u64>,
    /// Timestamp at which blob transactions (Cancun) activate.
    pub cancun_time: Option<u64>,
    /// The EIP-1559 parameters of the chain.
    pub base_fee_params: BaseFeeParams,
}

impl ChainSpec {
    /// The Ethereum mainnet spec.
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            genesis_hash: b256!("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"),
            terminal_total_difficulty: Some(U256::from(58_750_000_000_000_000_000_000u128)),
            shanghai_time: Some(1_681_338_455),
            cancun_time: None,
            base_fee_params: BaseFeeParams::ethereum(),
        }
    }

    /// Returns `true` if withdrawals are active at the given block timestamp.
    pub fn is_shanghai_active_at_timestamp(&self, timestamp: u64) -> bool {
        self.shanghai_time.is_some_and(|time| timestamp >= time)
    }

    /// Returns `true` if blob transactions are active at the given block timestamp.
    pub fn is_cancun_active_at_timestamp(&self, timestamp: u64) -> bool {
        self.cancun_time.is_some_and(|time| timestamp >= time)
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}
