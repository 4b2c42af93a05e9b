use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// The proof-of-stake transition configuration, exchanged between consensus and execution layer
/// to detect a configuration mismatch before the merge happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionConfiguration {
    /// The total difficulty that triggers the transition.
    pub terminal_total_difficulty: U256,
    /// The hash of the terminal block, if decided ahead of time.
    pub terminal_block_hash: B256,
    /// The number of the terminal block, if decided ahead of time.
    #[serde(with = "alloy_serde::quantity")]
    pub terminal_block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_configuration_serde() {
        let json = r#"{
            "terminalTotalDifficulty": "0xc70d808a128d7380000",
            "terminalBlockHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "terminalBlockNumber": "0x0"
        }"#;
        let config: TransitionConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.terminal_total_difficulty,
            U256::from(58_750_000_000_000_000_000_000u128)
        );
        assert_eq!(config.terminal_block_number, 0);
        let roundtripped: TransitionConfiguration =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(roundtripped, config);
    }
}
