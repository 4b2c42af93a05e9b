use alloy_consensus::{SignableTransaction, TxEip4844, TxEip4844WithSidecar, TxLegacy};
use alloy_eips::eip4844::{Blob, Bytes48};
use alloy_primitives::{keccak256, Address, Bytes, Signature, TxKind, B256, U256};
use opal_primitives::{BlobTransactionSidecar, Block, Header, PooledTransaction};

fn signature() -> Signature {
    Signature::new(U256::from(1u64), U256::from(2u64), false)
}

/// A signed legacy transaction with the given nonce, gas limit and gas price.
pub fn signed_tx(nonce: u64, gas_limit: u64, gas_price: u128) -> PooledTransaction {
    let tx = TxLegacy {
        chain_id: Some(1),
        nonce,
        gas_price,
        gas_limit,
        to: TxKind::Call(Address::with_last_byte(0x11)),
        value: U256::from(1_000u64),
        input: Bytes::new(),
    };
    PooledTransaction::Legacy(tx.into_signed(signature()))
}

/// A signed blob transaction carrying `blob_count` marker-filled blobs.
pub fn blob_tx(nonce: u64, blob_count: usize) -> PooledTransaction {
    let tx = TxEip4844 {
        chain_id: 1,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: 10_000_000_000,
        max_priority_fee_per_gas: 1_000_000_000,
        to: Address::with_last_byte(0x22),
        value: U256::ZERO,
        access_list: Default::default(),
        blob_versioned_hashes: (1..=blob_count as u8).map(B256::with_last_byte).collect(),
        max_fee_per_blob_gas: 1,
        input: Bytes::new(),
    };
    let sidecar = BlobTransactionSidecar {
        blobs: (1..=blob_count as u8).map(Blob::repeat_byte).collect(),
        commitments: (1..=blob_count as u8).map(Bytes48::repeat_byte).collect(),
        proofs: (1..=blob_count as u8).map(Bytes48::repeat_byte).collect(),
    };
    let tx = TxEip4844WithSidecar::from_tx_and_sidecar(tx, sidecar);
    PooledTransaction::Eip4844(tx.into_signed(signature()))
}

/// An empty block on top of the given parent hash, with a state root unique to
/// `(parent_hash, number)` so executed/unexecuted distinctions stay unambiguous.
pub fn block_with_parent(parent_hash: B256, number: u64) -> Block {
    let mut seed = [0u8; 40];
    seed[..32].copy_from_slice(parent_hash.as_slice());
    seed[32..].copy_from_slice(&number.to_be_bytes());
    Block {
        header: Header {
            parent_hash,
            state_root: keccak256(seed),
            number,
            gas_limit: 30_000_000,
            timestamp: 1_690_000_000 + number * 12,
            base_fee_per_gas: Some(7),
            ..Default::default()
        },
        ..Default::default()
    }
}
