use alloy_consensus::{EthereumTxEnvelope, Signed, TxEip4844};

/// Signed transaction in its canonical (in-block) form, without blob sidecars.
pub type TransactionSigned = EthereumTxEnvelope<TxEip4844>;

/// Signed transaction in its pool form; EIP-4844 transactions carry their blob sidecar.
pub use alloy_consensus::transaction::PooledTransaction;

/// Converts a pool transaction into its canonical in-block form, detaching the blob sidecar of
/// an EIP-4844 transaction. The transaction hash is preserved.
pub fn strip_blob_sidecar(tx: PooledTransaction) -> TransactionSigned {
    match tx {
        EthereumTxEnvelope::Legacy(tx) => TransactionSigned::Legacy(tx),
        EthereumTxEnvelope::Eip2930(tx) => TransactionSigned::Eip2930(tx),
        EthereumTxEnvelope::Eip1559(tx) => TransactionSigned::Eip1559(tx),
        EthereumTxEnvelope::Eip7702(tx) => TransactionSigned::Eip7702(tx),
        EthereumTxEnvelope::Eip4844(tx) => {
            let (tx, signature, hash) = tx.into_parts();
            TransactionSigned::Eip4844(Signed::new_unchecked(tx.tx, signature, hash))
        }
    }
}
