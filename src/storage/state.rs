//! Chain state management
//!
//! Tracks every block that may still matter for fork choice as a tree keyed
//! by block hash. Each node owns the UTXO set produced by its branch, so a
//! block is always validated against its own parent's state no matter which
//! branch is currently the longest.
//!
//! New blocks may only attach at a height above `max_height - cut_off_age`.
//! After each accepted block the tree evicts dead forks that fell behind that
//! horizon and releases the UTXO snapshots of ancestors that can no longer be
//! extended.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::constants::GENESIS_HEIGHT;
use crate::consensus::Block;
use crate::crypto::{Hash, SchnorrVerifier, SignatureVerifier};
use crate::mining::TransactionPool;
use crate::storage::{OutPoint, UTXOSet, UtxoError};
use crate::validation::{Transaction, TransactionError, TxHandler};

/// Why a block was not added to the tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block has no previous hash")]
    MissingPrevHash,
    #[error("block {0} already in the tree")]
    DuplicateBlock(Hash),
    #[error("unknown or pruned parent {0}")]
    UnknownParent(Hash),
    #[error("height {height} is at or below the pruning horizon (max height {max_height}, cut-off age {cut_off_age})")]
    BelowPruningHorizon {
        height: u64,
        max_height: u64,
        cut_off_age: u64,
    },
    #[error("transaction {index} rejected: {source}")]
    InvalidTransactionSet {
        index: usize,
        source: TransactionError,
    },
    #[error("coinbase output {0} already exists")]
    CoinbaseCollision(OutPoint),
}

/// A block in the tree together with the state it produces
#[derive(Debug)]
struct ChainNode {
    block: Block,
    /// State after this block. Released once the node can no longer be a parent.
    utxo_pool: Option<UTXOSet>,
    height: u64,
    parent: Option<Hash>,
    children: Vec<Hash>,
}

/// Statistics about the chain state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub height: u64,
    pub tip_hash: Hash,
    pub node_count: usize,
    pub utxo_count: usize,
    pub pending_transactions: usize,
}

/// Block tree with per-branch UTXO state and max-height fork choice
#[derive(Debug)]
pub struct BlockChain<V = SchnorrVerifier> {
    /// Block index: hash -> node
    nodes: HashMap<Hash, ChainNode>,
    /// Hash of the current max-height node
    tip_hash: Hash,
    /// Height of the current max-height node
    max_height: u64,
    cut_off_age: u64,
    prune: bool,
    tx_pool: Arc<TransactionPool>,
    verifier: V,
}

impl BlockChain<SchnorrVerifier> {
    /// Create a chain holding only `genesis` with default settings.
    ///
    /// The genesis block is trusted: only its coinbase is applied.
    pub fn new(genesis: Block) -> Self {
        Self::with_config(genesis, &LedgerConfig::default())
    }

    /// Create a chain holding only `genesis`
    pub fn with_config(genesis: Block, config: &LedgerConfig) -> Self {
        Self::with_verifier(genesis, config, SchnorrVerifier)
    }
}

impl<V: SignatureVerifier> BlockChain<V> {
    /// Create a chain holding only `genesis`, verifying signatures with `verifier`
    pub fn with_verifier(genesis: Block, config: &LedgerConfig, verifier: V) -> Self {
        let mut utxo_pool = UTXOSet::new();
        let issued = issue_coinbase(genesis.coinbase(), &mut utxo_pool);
        debug_assert!(issued.is_ok(), "coinbase outputs have distinct keys");

        let tip_hash = genesis.hash();
        info!(%tip_hash, utxos = utxo_pool.len(), "initialized chain from genesis");

        let mut nodes = HashMap::new();
        nodes.insert(
            tip_hash,
            ChainNode {
                block: genesis,
                utxo_pool: Some(utxo_pool),
                height: GENESIS_HEIGHT,
                parent: None,
                children: Vec::new(),
            },
        );

        Self {
            nodes,
            tip_hash,
            max_height: GENESIS_HEIGHT,
            cut_off_age: config.cut_off_age,
            prune: config.prune,
            tx_pool: Arc::new(TransactionPool::new()),
            verifier,
        }
    }

    /// Get the maximum height block. Ties keep the block that arrived first.
    pub fn max_height_block(&self) -> &Block {
        &self.tip_node().block
    }

    /// Copy of the UTXO set at the max-height block, for mining on top of it
    pub fn max_height_utxo_pool(&self) -> UTXOSet {
        self.tip_node().utxo_pool.clone().unwrap_or_default()
    }

    /// Height of the max-height block (genesis is 1)
    pub fn max_height(&self) -> u64 {
        self.max_height
    }

    /// Hash of the max-height block
    pub fn tip_hash(&self) -> Hash {
        self.tip_hash
    }

    /// The shared pool of pending transactions
    pub fn transaction_pool(&self) -> Arc<TransactionPool> {
        Arc::clone(&self.tx_pool)
    }

    /// Add a transaction to the pending pool. No validation is done here.
    pub fn add_transaction(&self, tx: Transaction) -> Hash {
        self.tx_pool.add_transaction(tx)
    }

    /// Verifier used for input signatures
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn cut_off_age(&self) -> u64 {
        self.cut_off_age
    }

    /// Add `block` if it is valid. See [`try_add_block`](Self::try_add_block).
    pub fn add_block(&mut self, block: Block) -> bool {
        match self.try_add_block(block) {
            Ok(_) => true,
            Err(e) => {
                debug!("rejected block: {e}");
                false
            }
        }
    }

    /// Add `block` to the tree, returning its hash.
    ///
    /// Every transaction must be valid, in order, against the parent's UTXO
    /// set, and the block must land above `max_height - cut_off_age`. A
    /// rejected block leaves the tree untouched.
    pub fn try_add_block(&mut self, block: Block) -> Result<Hash, BlockError> {
        let prev_hash = *block.prev_hash().ok_or(BlockError::MissingPrevHash)?;
        let hash = block.hash();
        if self.nodes.contains_key(&hash) {
            return Err(BlockError::DuplicateBlock(hash));
        }

        let parent = self
            .nodes
            .get(&prev_hash)
            .ok_or(BlockError::UnknownParent(prev_hash))?;

        let height = parent.height + 1;
        let below_horizon = BlockError::BelowPruningHorizon {
            height,
            max_height: self.max_height,
            cut_off_age: self.cut_off_age,
        };
        if height.saturating_add(self.cut_off_age) <= self.max_height {
            return Err(below_horizon);
        }
        let parent_pool = parent.utxo_pool.as_ref().ok_or(below_horizon)?;

        let mut handler = TxHandler::new(parent_pool.clone(), &self.verifier);
        for (index, tx) in block.transactions().iter().enumerate() {
            handler
                .accept(tx)
                .map_err(|source| BlockError::InvalidTransactionSet { index, source })?;
        }

        let mut utxo_pool = handler.into_utxo_pool();
        issue_coinbase(block.coinbase(), &mut utxo_pool).map_err(|e| match e {
            UtxoError::AlreadyExists(outpoint) => BlockError::CoinbaseCollision(outpoint),
        })?;

        let tx_count = block.transactions().len();
        self.nodes.insert(
            hash,
            ChainNode {
                block,
                utxo_pool: Some(utxo_pool),
                height,
                parent: Some(prev_hash),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&prev_hash) {
            parent.children.push(hash);
        }

        if height > self.max_height {
            let previous_tip = self.tip_hash;
            self.max_height = height;
            self.tip_hash = hash;

            // The pool only tracks the max-height branch.
            let unpooled: usize = self
                .branch_since_fork(previous_tip, hash)
                .iter()
                .filter_map(|h| self.nodes.get(h))
                .map(|node| self.tx_pool.remove_confirmed_block(&node.block))
                .sum();
            info!(height, %hash, txs = tx_count, unpooled, "new max-height block");
        } else {
            debug!(height, %hash, txs = tx_count, "added fork block");
        }

        if self.prune {
            self.prune();
        }

        Ok(hash)
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.nodes.get(hash).map(|node| &node.block)
    }

    /// Get block height by hash
    pub fn get_block_height(&self, hash: &Hash) -> Option<u64> {
        self.nodes.get(hash).map(|node| node.height)
    }

    /// Copy of the UTXO set produced by a block, if it is still held
    pub fn utxo_pool_at(&self, hash: &Hash) -> Option<UTXOSet> {
        self.nodes.get(hash).and_then(|node| node.utxo_pool.clone())
    }

    /// Hashes of the known children of a block
    pub fn children_of(&self, hash: &Hash) -> Vec<Hash> {
        self.nodes
            .get(hash)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Parent hash of a block, `None` for genesis or unknown blocks
    pub fn parent_of(&self, hash: &Hash) -> Option<Hash> {
        self.nodes.get(hash).and_then(|node| node.parent)
    }

    pub fn contains_block(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Number of blocks held in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get statistics about the chain state
    pub fn get_stats(&self) -> ChainStats {
        ChainStats {
            height: self.max_height,
            tip_hash: self.tip_hash,
            node_count: self.nodes.len(),
            utxo_count: self
                .tip_node()
                .utxo_pool
                .as_ref()
                .map_or(0, UTXOSet::len),
            pending_transactions: self.tx_pool.len(),
        }
    }

    /// Blocks on the path to `new_tip` that are not ancestors of `old_tip`,
    /// oldest first
    fn branch_since_fork(&self, old_tip: Hash, new_tip: Hash) -> Vec<Hash> {
        let height_of = |hash: Option<Hash>| {
            hash.and_then(|h| self.nodes.get(&h)).map_or(0, |node| node.height)
        };

        let mut branch = Vec::new();
        let mut old = Some(old_tip);
        let mut new = Some(new_tip);
        while let Some(current) = new {
            if new == old {
                break;
            }
            let (new_height, old_height) = (height_of(new), height_of(old));
            if new_height >= old_height {
                branch.push(current);
                new = self.parent_of(&current);
            }
            if old_height >= new_height {
                old = old.and_then(|h| self.parent_of(&h));
            }
        }
        branch.reverse();
        branch
    }

    fn tip_node(&self) -> &ChainNode {
        &self.nodes[&self.tip_hash]
    }

    /// Evict nodes that can no longer influence fork choice.
    ///
    /// Nodes at or above `max_height - cut_off_age` can still be extended
    /// and are kept with their ancestors. Everything else is a dead fork.
    /// Ancestors below that height keep their block but drop their UTXO set.
    fn prune(&mut self) {
        let horizon = self.max_height.saturating_sub(self.cut_off_age);

        let mut retained = HashSet::with_capacity(self.nodes.len());
        for (hash, node) in &self.nodes {
            if node.height < horizon {
                continue;
            }
            let mut cursor = Some(*hash);
            while let Some(current) = cursor {
                if !retained.insert(current) {
                    break;
                }
                cursor = self.nodes.get(&current).and_then(|n| n.parent);
            }
        }

        let evicted: Vec<Hash> = self
            .nodes
            .keys()
            .filter(|hash| !retained.contains(*hash))
            .copied()
            .collect();
        for hash in &evicted {
            if let Some(node) = self.nodes.remove(hash) {
                if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
                    parent.children.retain(|child| child != hash);
                }
            }
        }

        let mut released = 0;
        for node in self.nodes.values_mut() {
            if node.height < horizon && node.utxo_pool.take().is_some() {
                released += 1;
            }
        }

        if !evicted.is_empty() || released > 0 {
            debug!(
                evicted = evicted.len(),
                released,
                horizon,
                nodes = self.nodes.len(),
                "pruned chain tree"
            );
        }
    }
}

/// Add one UTXO per coinbase output, keyed by the coinbase hash.
///
/// Coinbase value and signatures are not checked.
fn issue_coinbase(coinbase: &Transaction, utxo_pool: &mut UTXOSet) -> Result<(), UtxoError> {
    for (outpoint, output) in coinbase.output_outpoints().zip(&coinbase.outputs) {
        utxo_pool.add(outpoint, output.clone())?;
    }
    Ok(())
}
