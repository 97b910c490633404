//! Block assembly
//!
//! Builds candidate blocks on top of the current max-height block from the
//! shared transaction pool. There is no proof-of-work: a candidate is ready
//! to hand to [`BlockChain::add_block`] as soon as it is assembled.

use tracing::{debug, info};

use crate::consensus::Block;
use crate::crypto::{PublicKey, SignatureVerifier};
use crate::storage::{BlockChain, UTXOSet};
use crate::validation::{estimate_fee, Amount, Transaction, TxHandler};

/// Block miner
#[derive(Debug, Clone)]
pub struct Miner {
    /// Receives the coinbase
    owner: PublicKey,
    /// Coinbase value before fees
    block_reward: Amount,
}

impl Miner {
    /// Create a new miner paying `block_reward` plus fees to `owner`
    pub fn new(owner: PublicKey, block_reward: Amount) -> Self {
        Self {
            owner,
            block_reward,
        }
    }

    pub fn owner(&self) -> PublicKey {
        self.owner
    }

    pub fn block_reward(&self) -> Amount {
        self.block_reward
    }

    /// Assemble a candidate block extending the max-height block.
    ///
    /// Pending transactions are selected by descending fee against the
    /// max-height UTXO set. The coinbase nonce is the new block's height.
    pub fn assemble_block<V: SignatureVerifier>(&self, chain: &BlockChain<V>) -> Block {
        let parent = chain.max_height_block().hash();
        let height = chain.max_height() + 1;
        let candidates = chain.transaction_pool().transactions();

        let (transactions, fees) =
            select_transactions(chain.max_height_utxo_pool(), chain.verifier(), &candidates);

        let reward = self.block_reward.saturating_add(fees);
        let coinbase = Transaction::coinbase(reward, self.owner, height);

        info!(
            height,
            parent = %parent.short(),
            txs = transactions.len(),
            pending = candidates.len(),
            reward,
            "assembled block"
        );
        Block::new(parent, coinbase, transactions)
    }
}

/// Run fee-maximizing selection and total the fees of what was picked
fn select_transactions<V: SignatureVerifier>(
    utxo_pool: UTXOSet,
    verifier: V,
    candidates: &[Transaction],
) -> (Vec<Transaction>, Amount) {
    let snapshot = utxo_pool.clone();
    let mut handler = TxHandler::new(utxo_pool, verifier);
    let selected = handler.handle_txs_max_fee(candidates);

    // Selected transactions may spend outputs created by earlier picks, so
    // fees are priced against the snapshot as it grows.
    let mut priced = snapshot;
    let mut fees: Amount = 0;
    for tx in &selected {
        let fee = Amount::try_from(estimate_fee(tx, &priced)).unwrap_or(0);
        fees = fees.saturating_add(fee);
        if let Err(e) = priced.apply_transaction(tx) {
            debug!("fee accounting skipped {}: {e}", tx.hash().short());
        }
    }
    (selected, fees)
}
