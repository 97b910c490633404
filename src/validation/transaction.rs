//! Transaction structure
//!
//! UTXO-based transactions with per-input Schnorr signatures. A transaction
//! with no inputs is a coinbase and only ever appears as a block's issuance.

use serde::{Deserialize, Serialize};

use crate::crypto::{hash_bytes, Hash, PrivateKey, PublicKey, SchnorrSignature};
use crate::storage::OutPoint;

/// Fixed-point amount in the smallest indivisible unit.
///
/// Signed so that negative outputs in untrusted transactions are
/// representable and can be rejected.
pub type Amount = i64;

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction containing the output
    pub prev_tx_hash: Hash,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Signature by the output's owner over `raw_data_to_sign(i)`
    pub signature: SchnorrSignature,
}

impl TxInput {
    /// The unspent output this input claims
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_tx_hash, self.output_index)
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in base units
    pub value: Amount,
    /// Key allowed to spend this output
    pub owner: PublicKey,
}

impl TxOutput {
    pub fn new(value: Amount, owner: PublicKey) -> Self {
        Self { value, owner }
    }
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction inputs
    pub inputs: Vec<TxInput>,
    /// Transaction outputs
    pub outputs: Vec<TxOutput>,
    /// Distinguishes transactions that would otherwise encode identically
    pub nonce: u64,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            nonce: 0,
        }
    }

    /// Create a coinbase transaction paying `value` to `owner`.
    ///
    /// `nonce` must differ between coinbases on the same chain, otherwise
    /// their outputs would share UTXO keys.
    pub fn coinbase(value: Amount, owner: PublicKey, nonce: u64) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: vec![TxOutput::new(value, owner)],
            nonce,
        }
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Append an unsigned input
    pub fn add_input(&mut self, prev_tx_hash: Hash, output_index: u32) {
        self.inputs.push(TxInput {
            prev_tx_hash,
            output_index,
            signature: SchnorrSignature::empty(),
        });
    }

    /// Append an output
    pub fn add_output(&mut self, value: Amount, owner: PublicKey) {
        self.outputs.push(TxOutput::new(value, owner));
    }

    /// Calculate transaction hash over the full encoding, signatures included
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }

    /// Payload signed by input `index`: that input's outpoint, every output
    /// and the nonce. Returns `None` if the input does not exist.
    pub fn raw_data_to_sign(&self, index: usize) -> Option<Vec<u8>> {
        let input = self.inputs.get(index)?;

        let mut bytes = Vec::with_capacity(36 + self.outputs.len() * 40 + 8);
        bytes.extend_from_slice(&input.prev_tx_hash.0);
        bytes.extend_from_slice(&input.output_index.to_le_bytes());
        self.encode_outputs(&mut bytes);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        Some(bytes)
    }

    /// Sign input `index` with `key`. Returns false if the input does not exist.
    pub fn sign_input(&mut self, index: usize, key: &PrivateKey) -> bool {
        match self.raw_data_to_sign(index) {
            Some(payload) => {
                self.inputs[index].signature = key.sign(&payload);
                true
            }
            None => false,
        }
    }

    /// Sum of output values, `None` on overflow
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs
            .iter()
            .try_fold(0 as Amount, |acc, o| acc.checked_add(o.value))
    }

    /// Keys the outputs of this transaction occupy once accepted
    pub fn output_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        let tx_hash = self.hash();
        (0..self.outputs.len() as u32).map(move |index| OutPoint::new(tx_hash, index))
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.prev_tx_hash.0);
            bytes.extend_from_slice(&input.output_index.to_le_bytes());
            bytes.extend_from_slice(&input.signature.0);
        }

        self.encode_outputs(&mut bytes);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    fn encode_outputs(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.value.to_le_bytes());
            bytes.extend_from_slice(&output.owner.0);
        }
    }
}
