use alloy_primitives::Log;

/// Receipt of a processed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Receipt {
    /// If the transaction was executed successfully.
    pub success: bool,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Log entries the transaction produced.
    pub logs: Vec<Log>,
}
