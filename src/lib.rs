//! Forkchain Core Library
//!
//! A UTXO ledger that keeps a bounded tree of competing forks, validates
//! every block against its own branch's state and follows the longest
//! branch. Transactions carry per-input Schnorr signatures.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mining;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod validation;

/// Protocol constants
pub mod constants {
    use crate::validation::Amount;

    /// How far below the best height a new block may still attach
    pub const CUT_OFF_AGE: u64 = 10;

    /// Height of the genesis block
    pub const GENESIS_HEIGHT: u64 = 1;

    /// Coinbase value before fees
    pub const DEFAULT_BLOCK_REWARD: Amount = 25;
}
