use alloy_eips::eip1559::{calc_next_block_base_fee, BaseFeeParams};
use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable};
use std::ops::Deref;

/// Block header.
///
/// The fee-market and withdrawal fields are optional trailing RLP fields:
/// `base_fee_per_gas` (EIP-1559), `withdrawals_root` (EIP-4895) and
/// `excess_data_gas` (EIP-4844).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The Keccak 256-bit hash of the parent block's header.
    pub parent_hash: B256,
    /// The Keccak 256-bit hash of the ommers list portion of this block.
    pub ommers_hash: B256,
    /// The 160-bit address to which all fees collected from the successful mining of this block
    /// be transferred.
    pub beneficiary: Address,
    /// The Keccak 256-bit hash of the root node of the state trie, after all transactions are
    /// executed and finalisations applied.
    pub state_root: B256,
    /// The Keccak 256-bit hash of the root node of the trie structure populated with each
    /// transaction in the transactions list portion of the block.
    pub transactions_root: B256,
    /// The Keccak 256-bit hash of the root node of the trie structure populated with the receipts
    /// of each transaction in the transactions list portion of the block.
    pub receipts_root: B256,
    /// The Bloom filter composed from indexable information (logger address and log topics)
    /// contained in each log entry from the receipt of each transaction in the transactions list.
    pub logs_bloom: Bloom,
    /// A scalar value corresponding to the difficulty level of this block. Zero for post-merge
    /// blocks.
    pub difficulty: U256,
    /// A scalar value equal to the number of ancestor blocks. The genesis block has a number of
    /// zero.
    pub number: u64,
    /// A scalar value equal to the current limit of gas expenditure per block.
    pub gas_limit: u64,
    /// A scalar value equal to the total gas used in transactions in this block.
    pub gas_used: u64,
    /// A scalar value equal to the reasonable output of Unix's time() at this block's inception.
    pub timestamp: u64,
    /// An arbitrary byte array containing data relevant to this block.
    pub extra_data: Bytes,
    /// The output of the randomness beacon for post-merge blocks (`prevRandao`).
    pub mix_hash: B256,
    /// Proof-of-work nonce. Zero for post-merge blocks.
    pub nonce: B64,
    /// A scalar representing the minimum fee per gas burned in this block, if the fee market is
    /// active.
    pub base_fee_per_gas: Option<u64>,
    /// The Keccak 256-bit hash of the withdrawals list portion of this block, if withdrawals are
    /// active.
    pub withdrawals_root: Option<B256>,
    /// A running total of data gas consumed in excess of the target, prior to this block, if the
    /// blob fee market is active.
    pub excess_data_gas: Option<u64>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: B256::ZERO,
            ommers_hash: alloy_consensus::constants::EMPTY_OMMER_ROOT_HASH,
            beneficiary: Address::ZERO,
            state_root: alloy_consensus::constants::EMPTY_ROOT_HASH,
            transactions_root: alloy_consensus::constants::EMPTY_ROOT_HASH,
            receipts_root: alloy_consensus::constants::EMPTY_ROOT_HASH,
            logs_bloom: Bloom::default(),
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: B256::ZERO,
            nonce: B64::ZERO,
            base_fee_per_gas: None,
            withdrawals_root: None,
            excess_data_gas: None,
        }
    }
}

impl Header {
    /// Heavy function that will calculate the hash of the fully RLP-encoded header.
    pub fn hash_slow(&self) -> B256 {
        let mut out = Vec::<u8>::new();
        self.encode(&mut out);
        keccak256(&out)
    }

    /// Seal the header with the computed block hash.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }

    /// Seal the header with a known hash, without recomputing it.
    ///
    /// WARNING: this method does not verify whether the hash is correct.
    pub fn seal(self, hash: B256) -> SealedHeader {
        SealedHeader { header: self, hash }
    }

    /// Calculates the base fee for the block built on top of this header, or `None` if this
    /// header carries no base fee (fee market not active).
    pub fn next_block_base_fee(&self, params: BaseFeeParams) -> Option<u64> {
        Some(calc_next_block_base_fee(
            self.gas_used,
            self.gas_limit,
            self.base_fee_per_gas?,
            params,
        ))
    }

    fn rlp_payload_length(&self) -> usize {
        let mut length = 0;
        length += self.parent_hash.length();
        length += self.ommers_hash.length();
        length += self.beneficiary.length();
        length += self.state_root.length();
        length += self.transactions_root.length();
        length += self.receipts_root.length();
        length += self.logs_bloom.length();
        length += self.difficulty.length();
        length += self.number.length();
        length += self.gas_limit.length();
        length += self.gas_used.length();
        length += self.timestamp.length();
        length += self.extra_data.length();
        length += self.mix_hash.length();
        length += self.nonce.length();
        if let Some(base_fee) = self.base_fee_per_gas {
            length += base_fee.length();
        }
        if let Some(root) = self.withdrawals_root {
            length += root.length();
        }
        if let Some(excess_data_gas) = self.excess_data_gas {
            length += excess_data_gas.length();
        }
        length
    }
}

impl Encodable for Header {
    fn encode(&self, out: &mut dyn BufMut) {
        let list_header =
            alloy_rlp::Header { list: true, payload_length: self.rlp_payload_length() };
        list_header.encode(out);
        self.parent_hash.encode(out);
        self.ommers_hash.encode(out);
        self.beneficiary.encode(out);
        self.state_root.encode(out);
        self.transactions_root.encode(out);
        self.receipts_root.encode(out);
        self.logs_bloom.encode(out);
        self.difficulty.encode(out);
        self.number.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        self.mix_hash.encode(out);
        self.nonce.encode(out);

        // Trailing fields in activation order. A later field implies the presence of all
        // earlier ones.
        if let Some(base_fee) = self.base_fee_per_gas {
            base_fee.encode(out);
        }
        if let Some(root) = self.withdrawals_root {
            root.encode(out);
        }
        if let Some(excess_data_gas) = self.excess_data_gas {
            excess_data_gas.encode(out);
        }
    }

    fn length(&self) -> usize {
        let payload_length = self.rlp_payload_length();
        payload_length + length_of_length(payload_length)
    }
}

impl Decodable for Header {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let rlp_head = alloy_rlp::Header::decode(buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString)
        }
        let started_len = buf.len();
        let mut this = Self {
            parent_hash: Decodable::decode(buf)?,
            ommers_hash: Decodable::decode(buf)?,
            beneficiary: Decodable::decode(buf)?,
            state_root: Decodable::decode(buf)?,
            transactions_root: Decodable::decode(buf)?,
            receipts_root: Decodable::decode(buf)?,
            logs_bloom: Decodable::decode(buf)?,
            difficulty: Decodable::decode(buf)?,
            number: u64::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            gas_used: u64::decode(buf)?,
            timestamp: u64::decode(buf)?,
            extra_data: Decodable::decode(buf)?,
            mix_hash: Decodable::decode(buf)?,
            nonce: Decodable::decode(buf)?,
            base_fee_per_gas: None,
            withdrawals_root: None,
            excess_data_gas: None,
        };

        if started_len - buf.len() < rlp_head.payload_length {
            this.base_fee_per_gas = Some(u64::decode(buf)?);
        }
        if started_len - buf.len() < rlp_head.payload_length {
            this.withdrawals_root = Some(Decodable::decode(buf)?);
        }
        if started_len - buf.len() < rlp_head.payload_length {
            this.excess_data_gas = Some(u64::decode(buf)?);
        }

        let consumed = started_len - buf.len();
        if consumed != rlp_head.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: rlp_head.payload_length,
                got: consumed,
            })
        }
        Ok(this)
    }
}

/// A [`Header`] that is sealed at a precalculated hash.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SealedHeader {
    /// Locked header.
    header: Header,
    /// Block hash.
    hash: B256,
}

impl SealedHeader {
    /// Returns the sealed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the block hash.
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Extract the raw header, discarding the hash.
    pub fn unseal(self) -> Header {
        self.header
    }

    /// Splits the sealed header into the header and the hash.
    pub fn split(self) -> (Header, B256) {
        (self.header, self.hash)
    }
}

impl Deref for SealedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(header: &Header) {
        let mut encoded = Vec::new();
        header.encode(&mut encoded);
        assert_eq!(encoded.len(), header.length());
        let decoded = Header::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(&decoded, header);
    }

    #[test]
    fn header_rlp_roundtrip_legacy() {
        roundtrip(&Header {
            number: 124,
            difficulty: U256::from(17_000_000_000u64),
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_688_000_000,
            extra_data: Bytes::from_static(b"opal"),
            ..Default::default()
        });
    }

    #[test]
    fn header_rlp_roundtrip_post_london() {
        roundtrip(&Header {
            number: 15_537_395,
            gas_limit: 30_000_000,
            gas_used: 12_345_678,
            base_fee_per_gas: Some(7),
            ..Default::default()
        });
    }

    #[test]
    fn header_rlp_roundtrip_with_withdrawals_and_blobs() {
        roundtrip(&Header {
            number: 17_034_870,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(22_904_344_399),
            withdrawals_root: Some(B256::with_last_byte(0x42)),
            excess_data_gas: Some(0),
            ..Default::default()
        });
    }

    #[test]
    fn sealed_header_matches_slow_hash() {
        let header = Header { number: 1, gas_limit: 8_000_000, ..Default::default() };
        let hash = header.hash_slow();
        let sealed = header.seal_slow();
        assert_eq!(sealed.hash(), hash);
        assert_eq!(sealed.unseal().hash_slow(), hash);
    }

    #[test]
    fn next_base_fee_requires_fee_market() {
        let header = Header { gas_used: 15_000_000, gas_limit: 30_000_000, ..Default::default() };
        assert_eq!(header.next_block_base_fee(BaseFeeParams::ethereum()), None);

        // at exactly the gas target the base fee carries over unchanged
        let header = Header {
            gas_used: 15_000_000,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(1_000_000_000),
            ..Default::default()
        };
        assert_eq!(header.next_block_base_fee(BaseFeeParams::ethereum()), Some(1_000_000_000));
    }
}
