//! Genesis block generation
//!
//! The genesis block has no parent and no regular transactions. Its single
//! coinbase output seeds the initial UTXO set.

use crate::consensus::Block;
use crate::crypto::{Hash, PublicKey};
use crate::validation::{Amount, Transaction};

/// Coinbase nonce reserved for genesis. Mined coinbases use their height (>= 2).
const GENESIS_NONCE: u64 = 0;

/// Create a genesis block paying `value` to `owner`.
///
/// Deterministic: the same owner and value always produce the same block.
pub fn create_genesis_block(owner: PublicKey, value: Amount) -> Block {
    Block::genesis(Transaction::coinbase(value, owner, GENESIS_NONCE))
}

/// Summary of a genesis block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisInfo {
    pub hash: Hash,
    pub merkle_root: Hash,
    pub owner: PublicKey,
    pub allocation: Amount,
}

impl GenesisInfo {
    /// Describe `block`. Returns `None` if it is not a genesis block.
    pub fn from_block(block: &Block) -> Option<Self> {
        if !block.is_genesis() {
            return None;
        }
        let output = block.coinbase().outputs.first()?;
        Some(Self {
            hash: block.hash(),
            merkle_root: block.merkle_root(),
            owner: output.owner,
            allocation: block.coinbase().total_output_value()?,
        })
    }
}
