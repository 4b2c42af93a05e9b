//! Ethereum protocol-related constants.

/// Minimum gas consumed by any transaction.
pub const MIN_TRANSACTION_GAS: u64 = 21_000;

/// The first version of the blob fee market starts the excess accumulator at zero.
pub const INITIAL_EXCESS_DATA_GAS: u64 = 0;
