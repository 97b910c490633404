//! Transaction selection
//!
//! A [`TxHandler`] owns a private copy of a UTXO set and admits transactions
//! into it one at a time, either in the order given or by descending fee.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::crypto::{Hash, SignatureVerifier};
use crate::storage::UTXOSet;
use crate::validation::{check_transaction, estimate_fee, Amount, Transaction, TransactionError};

/// How a batch of candidate transactions is admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Accept each transaction that is valid when reached, in the given order
    #[default]
    FirstFit,
    /// Repeatedly accept the highest-fee transaction that is still valid
    MaxFee,
}

/// Validates transactions and applies accepted ones to its UTXO pool
#[derive(Debug)]
pub struct TxHandler<V> {
    utxo_pool: UTXOSet,
    verifier: V,
}

impl<V: SignatureVerifier> TxHandler<V> {
    /// Create a handler over `utxo_pool`, which it takes ownership of
    pub fn new(utxo_pool: UTXOSet, verifier: V) -> Self {
        Self {
            utxo_pool,
            verifier,
        }
    }

    /// Current pool, reflecting every accepted transaction
    pub fn utxo_pool(&self) -> &UTXOSet {
        &self.utxo_pool
    }

    /// Consume the handler and return its pool
    pub fn into_utxo_pool(self) -> UTXOSet {
        self.utxo_pool
    }

    /// Check a transaction against the current pool
    pub fn check(&self, tx: &Transaction) -> Result<Amount, TransactionError> {
        check_transaction(tx, &self.utxo_pool, &self.verifier)
    }

    /// Whether a transaction is valid against the current pool
    pub fn is_valid_tx(&self, tx: &Transaction) -> bool {
        self.check(tx).is_ok()
    }

    /// Validate `tx` and apply it to the pool, returning its fee.
    ///
    /// The pool is unchanged on error.
    pub fn accept(&mut self, tx: &Transaction) -> Result<Amount, TransactionError> {
        let fee = self.check(tx)?;
        self.utxo_pool.apply_transaction(tx)?;
        Ok(fee)
    }

    /// Admit a batch under the given policy
    pub fn select(&mut self, policy: SelectionPolicy, txs: &[Transaction]) -> Vec<Transaction> {
        match policy {
            SelectionPolicy::FirstFit => self.handle_txs(txs),
            SelectionPolicy::MaxFee => self.handle_txs_max_fee(txs),
        }
    }

    /// First-fit selection.
    ///
    /// Each transaction is checked against the pool as updated by the ones
    /// accepted before it. A rejected transaction is not retried, so a
    /// transaction spending an output created later in the batch is dropped.
    pub fn handle_txs(&mut self, txs: &[Transaction]) -> Vec<Transaction> {
        let mut accepted = Vec::with_capacity(txs.len());
        for tx in txs {
            match self.accept(tx) {
                Ok(fee) => {
                    trace!(tx = %tx.hash().short(), fee, "accepted transaction");
                    accepted.push(tx.clone());
                }
                Err(e) => debug!(tx = %tx.hash().short(), "skipped transaction: {e}"),
            }
        }
        accepted
    }

    /// Greedy fee-maximizing selection.
    ///
    /// Fees are recomputed against the current pool before every pick, since
    /// each acceptance can spend inputs or create outputs other candidates
    /// depend on. The highest fee wins, ties go to the lower transaction
    /// hash. A candidate that is invalid when picked is discarded.
    pub fn handle_txs_max_fee(&mut self, txs: &[Transaction]) -> Vec<Transaction> {
        let mut seen = HashSet::with_capacity(txs.len());
        let mut candidates: Vec<(Hash, &Transaction)> = txs
            .iter()
            .map(|tx| (tx.hash(), tx))
            .filter(|(hash, _)| seen.insert(*hash))
            .collect();

        let mut accepted = Vec::with_capacity(candidates.len());
        while !candidates.is_empty() {
            let mut best = 0;
            let mut best_fee = estimate_fee(candidates[0].1, &self.utxo_pool);
            for (position, (hash, tx)) in candidates.iter().enumerate().skip(1) {
                let fee = estimate_fee(tx, &self.utxo_pool);
                if fee > best_fee || (fee == best_fee && *hash < candidates[best].0) {
                    best = position;
                    best_fee = fee;
                }
            }

            let (hash, tx) = candidates.swap_remove(best);
            match self.accept(tx) {
                Ok(fee) => {
                    trace!(tx = %hash.short(), fee, "accepted transaction");
                    accepted.push(tx.clone());
                }
                Err(e) => debug!(tx = %hash.short(), "discarded transaction: {e}"),
            }
        }
        accepted
    }
}
