//! UTXO set implementation
//!
//! In-memory map of unspent transaction outputs. Every chain node owns its
//! own copy; cloning is a deep copy so branches never observe each other.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Hash, PublicKey};
use crate::validation::{Amount, Transaction, TxOutput};

/// UTXO set errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UtxoError {
    #[error("UTXO already present: {0}")]
    AlreadyExists(OutPoint),
}

/// Key for UTXO lookup: (tx_hash, output_index)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the transaction that created the output
    pub tx_hash: Hash,
    /// Position of the output in that transaction
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({}:{})", self.tx_hash.short(), self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// Set of all unspent transaction outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UTXOSet {
    utxos: HashMap<OutPoint, TxOutput>,
}

impl UTXOSet {
    /// Create a new empty UTXO set
    pub fn new() -> Self {
        Self {
            utxos: HashMap::new(),
        }
    }

    /// Check if a UTXO exists
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Get a UTXO if it exists
    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.utxos.get(outpoint)
    }

    /// Add a UTXO. Fails without modifying the set if the key is taken.
    pub fn add(&mut self, outpoint: OutPoint, output: TxOutput) -> Result<(), UtxoError> {
        if self.utxos.contains_key(&outpoint) {
            return Err(UtxoError::AlreadyExists(outpoint));
        }
        self.utxos.insert(outpoint, output);
        Ok(())
    }

    /// Remove a UTXO (when spent)
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.utxos.remove(outpoint)
    }

    /// Apply an accepted transaction to the set.
    ///
    /// Removes the claimed outputs and adds `(tx.hash(), i)` for each new
    /// output. The caller must have validated the transaction. Nothing is
    /// changed if any new output key is already present.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), UtxoError> {
        let created: Vec<OutPoint> = tx.output_outpoints().collect();
        if let Some(taken) = created.iter().find(|key| self.contains(key)) {
            return Err(UtxoError::AlreadyExists(*taken));
        }

        for input in &tx.inputs {
            self.remove(&input.outpoint());
        }

        for (outpoint, output) in created.into_iter().zip(&tx.outputs) {
            self.utxos.insert(outpoint, output.clone());
        }

        Ok(())
    }

    /// Iterate over all unspent outputs
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.utxos.iter()
    }

    /// Get all UTXOs owned by a key
    pub fn get_by_owner(&self, owner: &PublicKey) -> Vec<(OutPoint, &TxOutput)> {
        self.utxos
            .iter()
            .filter(|(_, output)| output.owner == *owner)
            .map(|(key, output)| (*key, output))
            .collect()
    }

    /// Get total balance for an owner, `None` on overflow
    pub fn balance_of(&self, owner: &PublicKey) -> Option<Amount> {
        self.get_by_owner(owner)
            .iter()
            .try_fold(0 as Amount, |acc, (_, output)| acc.checked_add(output.value))
    }

    /// Sum of every unspent value, `None` on overflow
    pub fn total_value(&self) -> Option<Amount> {
        self.utxos
            .values()
            .try_fold(0 as Amount, |acc, output| acc.checked_add(output.value))
    }

    /// Get total number of UTXOs
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}
