//! Transaction validity rules
//!
//! Pure checks of a single transaction against a UTXO set snapshot.

use std::collections::HashSet;

use thiserror::Error;

use crate::crypto::SignatureVerifier;
use crate::storage::{OutPoint, UTXOSet, UtxoError};
use crate::validation::{Amount, Transaction};

/// Why a transaction was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("input {index} claims missing UTXO {outpoint}")]
    MissingUtxo { index: usize, outpoint: OutPoint },
    #[error("input {index} claims {outpoint} a second time")]
    DoubleSpendWithinTx { index: usize, outpoint: OutPoint },
    #[error("invalid signature on input {index}")]
    BadSignature { index: usize },
    #[error("output {index} has negative value {value}")]
    NegativeOutput { index: usize, value: Amount },
    #[error("outputs {outputs} exceed inputs {inputs}")]
    Unbalanced { inputs: Amount, outputs: Amount },
    #[error("value overflow")]
    ValueOverflow,
    #[error("output {0} already exists")]
    OutputCollision(OutPoint),
}

impl From<UtxoError> for TransactionError {
    fn from(err: UtxoError) -> Self {
        match err {
            UtxoError::AlreadyExists(outpoint) => TransactionError::OutputCollision(outpoint),
        }
    }
}

/// Check `tx` against `utxo_set` and return its fee.
///
/// Conditions are checked in this order, each as a full pass:
/// 1. every claimed UTXO exists
/// 2. no UTXO is claimed twice
/// 3. every input signature verifies against the claimed output's owner
/// 4. every output value is non-negative
/// 5. claimed input value covers output value
///
/// `utxo_set` is never modified.
pub fn check_transaction<V>(
    tx: &Transaction,
    utxo_set: &UTXOSet,
    verifier: &V,
) -> Result<Amount, TransactionError>
where
    V: SignatureVerifier + ?Sized,
{
    let mut claimed = Vec::with_capacity(tx.inputs.len());
    for (index, input) in tx.inputs.iter().enumerate() {
        let outpoint = input.outpoint();
        match utxo_set.get(&outpoint) {
            Some(output) => claimed.push(output),
            None => return Err(TransactionError::MissingUtxo { index, outpoint }),
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (index, input) in tx.inputs.iter().enumerate() {
        let outpoint = input.outpoint();
        if !seen.insert(outpoint) {
            return Err(TransactionError::DoubleSpendWithinTx { index, outpoint });
        }
    }

    for (index, (input, output)) in tx.inputs.iter().zip(&claimed).enumerate() {
        let verified = tx
            .raw_data_to_sign(index)
            .map(|payload| verifier.verify(&output.owner, &payload, &input.signature))
            .unwrap_or(false);
        if !verified {
            return Err(TransactionError::BadSignature { index });
        }
    }

    if let Some((index, output)) = tx.outputs.iter().enumerate().find(|(_, o)| o.value < 0) {
        return Err(TransactionError::NegativeOutput {
            index,
            value: output.value,
        });
    }

    let inputs = claimed
        .iter()
        .try_fold(0 as Amount, |acc, output| acc.checked_add(output.value))
        .ok_or(TransactionError::ValueOverflow)?;
    let outputs = tx
        .total_output_value()
        .ok_or(TransactionError::ValueOverflow)?;

    if inputs < outputs {
        return Err(TransactionError::Unbalanced { inputs, outputs });
    }

    Ok(inputs - outputs)
}

/// Boolean form of [`check_transaction`]
pub fn is_valid<V>(tx: &Transaction, utxo_set: &UTXOSet, verifier: &V) -> bool
where
    V: SignatureVerifier + ?Sized,
{
    check_transaction(tx, utxo_set, verifier).is_ok()
}

/// Fee used to rank candidates during selection.
///
/// Inputs missing from `utxo_set` are skipped rather than failing, since the
/// result only orders candidates and says nothing about validity. Widened to
/// `i128` so that no combination of `i64` values can overflow.
pub fn estimate_fee(tx: &Transaction, utxo_set: &UTXOSet) -> i128 {
    let inputs: i128 = tx
        .inputs
        .iter()
        .filter_map(|input| utxo_set.get(&input.outpoint()))
        .map(|output| output.value as i128)
        .sum();
    let outputs: i128 = tx.outputs.iter().map(|o| o.value as i128).sum();
    inputs - outputs
}
