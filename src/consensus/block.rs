//! Block structure
//!
//! A block names its parent, carries one coinbase issuance and an ordered
//! list of regular transactions. Its hash commits to all three.

use serde::{Deserialize, Serialize};

use crate::crypto::{compute_merkle_root, hash_bytes, Hash};
use crate::validation::Transaction;

/// A complete block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the parent block, `None` only for genesis
    pub prev_hash: Option<Hash>,
    /// Issuance transaction, applied after the regular transactions
    pub coinbase: Transaction,
    /// Regular transactions in declared order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block on top of `prev_hash`
    pub fn new(prev_hash: Hash, coinbase: Transaction, transactions: Vec<Transaction>) -> Self {
        Self {
            prev_hash: Some(prev_hash),
            coinbase,
            transactions,
        }
    }

    /// Create a parentless block
    pub fn genesis(coinbase: Transaction) -> Self {
        Self {
            prev_hash: None,
            coinbase,
            transactions: Vec::new(),
        }
    }

    /// Merkle root of the coinbase followed by every transaction
    pub fn merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = std::iter::once(&self.coinbase)
            .chain(&self.transactions)
            .map(Transaction::hash)
            .collect();
        compute_merkle_root(&hashes)
    }

    /// Serialize the block commitment for hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(65);
        match &self.prev_hash {
            Some(prev) => {
                bytes.push(1);
                bytes.extend_from_slice(&prev.0);
            }
            None => {
                bytes.push(0);
                bytes.extend_from_slice(&Hash::zero().0);
            }
        }
        bytes.extend_from_slice(&self.merkle_root().0);
        bytes
    }

    /// Get the block hash
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }

    /// Parent hash, if any
    pub fn prev_hash(&self) -> Option<&Hash> {
        self.prev_hash.as_ref()
    }

    /// Regular transactions in declared order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// The issuance transaction
    pub fn coinbase(&self) -> &Transaction {
        &self.coinbase
    }

    /// Check if this is a genesis block
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }
}
