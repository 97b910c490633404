//! Pending transaction pool
//!
//! Shared across all branches of the chain tree. Holds candidates for the
//! next block without validating them; validation happens when a block is
//! assembled or accepted.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::OutPoint;
use crate::validation::Transaction;

/// Thread-safe map from transaction hash to transaction
#[derive(Debug, Default)]
pub struct TransactionPool {
    txs: Mutex<HashMap<Hash, Transaction>>,
}

impl TransactionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            txs: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a transaction, replacing an identical one. Returns its hash.
    pub fn add_transaction(&self, tx: Transaction) -> Hash {
        let hash = tx.hash();
        trace!(tx = %hash.short(), "pooled transaction");
        self.txs.lock().insert(hash, tx);
        hash
    }

    /// Remove a transaction by hash
    pub fn remove_transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.txs.lock().remove(hash)
    }

    /// Look up a transaction by hash
    pub fn get_transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.txs.lock().get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.txs.lock().contains_key(hash)
    }

    /// Snapshot of every pending transaction, ordered by hash
    pub fn transactions(&self) -> Vec<Transaction> {
        let txs = self.txs.lock();
        let mut entries: Vec<(&Hash, &Transaction)> = txs.iter().collect();
        entries.sort_by_key(|(hash, _)| **hash);
        entries.into_iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Remove and return every pending transaction, ordered by hash
    pub fn drain(&self) -> Vec<Transaction> {
        let mut entries: Vec<(Hash, Transaction)> = self.txs.lock().drain().collect();
        entries.sort_by_key(|(hash, _)| *hash);
        entries.into_iter().map(|(_, tx)| tx).collect()
    }

    /// Remove transactions confirmed in a block and any that conflict.
    ///
    /// Drops every pooled transaction whose hash appears in `block`, and
    /// every pooled transaction spending an outpoint one of the block's
    /// transactions spends. Returns how many were removed.
    pub fn remove_confirmed_block(&self, block: &Block) -> usize {
        let confirmed: HashSet<Hash> = block.transactions().iter().map(Transaction::hash).collect();
        let spent: HashSet<OutPoint> = block
            .transactions()
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();

        let mut txs = self.txs.lock();
        let before = txs.len();
        txs.retain(|hash, tx| {
            !confirmed.contains(hash)
                && !tx.inputs.iter().any(|input| spent.contains(&input.outpoint()))
        });
        let removed = before - txs.len();
        if removed > 0 {
            debug!(removed, remaining = txs.len(), "removed confirmed and conflicting transactions");
        }
        removed
    }

    /// Drop every pending transaction
    pub fn clear(&self) {
        self.txs.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.txs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.lock().is_empty()
    }
}
