//! End-to-end chain scenarios: forks, pruning horizon, mining and relay.

use forkchain::config::LedgerConfig;
use forkchain::consensus::Block;
use forkchain::crypto::{hash_bytes, Hash, PrivateKey, PublicKey};
use forkchain::mining::Miner;
use forkchain::node::create_genesis_block;
use forkchain::p2p::{Candidate, CompliantNode};
use forkchain::storage::{BlockChain, BlockError, OutPoint};
use forkchain::validation::{Amount, Transaction, TxOutput};

fn coinbase(owner: PublicKey, nonce: u64) -> Transaction {
    Transaction::coinbase(25, owner, nonce)
}

/// Spend output `index` of `prev` into `outputs`, signed by `key`
fn pay(prev: &Transaction, index: u32, key: &PrivateKey, outputs: &[(Amount, PublicKey)]) -> Transaction {
    let mut tx = Transaction::new(
        vec![],
        outputs.iter().map(|(v, o)| TxOutput::new(*v, *o)).collect(),
    );
    tx.add_input(prev.hash(), index);
    tx.sign_input(0, key);
    tx
}

/// Extend `parent` with `count` empty blocks, returning their hashes
fn extend(chain: &mut BlockChain, mut parent: Hash, count: u64, owner: PublicKey, nonce_base: u64) -> Vec<Hash> {
    let mut hashes = Vec::new();
    for i in 0..count {
        let block = Block::new(parent, coinbase(owner, nonce_base + i), vec![]);
        parent = block.hash();
        assert!(chain.add_block(block), "block {i} on the extension was rejected");
        hashes.push(parent);
    }
    hashes
}

#[test]
fn spend_genesis_allocation() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());

    let tx = pay(genesis.coinbase(), 0, &alice, &[(60, bob), (40, alice.public_key())]);
    let b1 = Block::new(genesis.hash(), coinbase(bob, 2), vec![tx.clone()]);
    assert!(chain.add_block(b1.clone()));

    let utxos = chain.max_height_utxo_pool();
    assert_eq!(chain.max_height(), 2);
    assert!(!utxos.contains(&OutPoint::new(genesis.coinbase().hash(), 0)));
    assert_eq!(utxos.get(&OutPoint::new(tx.hash(), 0)).map(|o| o.value), Some(60));
    assert_eq!(utxos.balance_of(&bob), Some(85));
    assert_eq!(utxos.balance_of(&alice.public_key()), Some(40));
}

#[test]
fn forks_keep_separate_state() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let carol = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());

    // Both forks spend the same genesis output to different payees.
    let to_bob = pay(genesis.coinbase(), 0, &alice, &[(100, bob)]);
    let to_carol = pay(genesis.coinbase(), 0, &alice, &[(100, carol)]);
    let left = Block::new(genesis.hash(), coinbase(alice.public_key(), 2), vec![to_bob]);
    let right = Block::new(genesis.hash(), coinbase(alice.public_key(), 3), vec![to_carol]);
    assert!(chain.add_block(left.clone()));
    assert!(chain.add_block(right.clone()));

    assert_eq!(chain.max_height_block(), &left);
    let left_state = chain.utxo_pool_at(&left.hash()).unwrap();
    let right_state = chain.utxo_pool_at(&right.hash()).unwrap();
    assert_eq!(left_state.balance_of(&bob), Some(100));
    assert_eq!(left_state.balance_of(&carol), Some(0));
    assert_eq!(right_state.balance_of(&carol), Some(100));

    // Extending the right fork makes it the tip.
    extend(&mut chain, right.hash(), 1, alice.public_key(), 10);
    assert_eq!(chain.max_height(), 3);
    assert_eq!(chain.max_height_utxo_pool().balance_of(&carol), Some(100));
}

#[test]
fn pruning_horizon_limits_fork_depth() {
    let miner = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(miner, 100);
    let mut chain = BlockChain::new(genesis.clone());

    // Heights 2..=11: a fork off genesis (height 2) is still allowed.
    extend(&mut chain, genesis.hash(), 10, miner, 100);
    assert_eq!(chain.max_height(), 11);
    let early_fork = Block::new(genesis.hash(), coinbase(miner, 500), vec![]);
    assert!(chain.add_block(early_fork));

    // Height 12: genesis can no longer be a parent.
    let tip = chain.max_height_block().hash();
    extend(&mut chain, tip, 1, miner, 200);
    assert_eq!(chain.max_height(), 12);

    let late_fork = Block::new(genesis.hash(), coinbase(miner, 501), vec![]);
    assert_eq!(
        chain.try_add_block(late_fork),
        Err(BlockError::BelowPruningHorizon {
            height: 2,
            max_height: 12,
            cut_off_age: 10,
        })
    );
}

#[test]
fn rejected_block_leaves_chain_untouched() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());

    let good = pay(genesis.coinbase(), 0, &alice, &[(50, bob), (50, alice.public_key())]);
    // Overspends the 50 it claims.
    let bad = pay(&good, 1, &alice, &[(60, bob)]);

    let block = Block::new(genesis.hash(), coinbase(bob, 2), vec![good, bad]);
    let before = chain.max_height_utxo_pool();
    assert!(matches!(
        chain.try_add_block(block),
        Err(BlockError::InvalidTransactionSet { index: 1, .. })
    ));
    assert_eq!(chain.max_height_utxo_pool(), before);
    assert_eq!(chain.node_count(), 1);
}

#[test]
fn unknown_parent_rejected() {
    let miner = PrivateKey::generate().public_key();
    let mut chain = BlockChain::new(create_genesis_block(miner, 100));
    let orphan = Block::new(hash_bytes(b"missing"), coinbase(miner, 2), vec![]);

    assert!(!chain.add_block(orphan));
    assert_eq!(chain.max_height(), 1);
}

#[test]
fn max_height_pool_is_a_copy() {
    let miner = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(miner, 100);
    let chain = BlockChain::new(genesis.clone());

    let mut copy = chain.max_height_utxo_pool();
    copy.remove(&OutPoint::new(genesis.coinbase().hash(), 0));

    assert!(copy.is_empty());
    assert_eq!(chain.max_height_utxo_pool().len(), 1);
}

#[test]
fn dead_forks_are_evicted() {
    let miner = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(miner, 100);
    let config = LedgerConfig {
        cut_off_age: 3,
        ..LedgerConfig::default()
    };
    let mut chain = BlockChain::with_config(genesis.clone(), &config);

    let main = extend(&mut chain, genesis.hash(), 2, miner, 10);
    let side = extend(&mut chain, genesis.hash(), 1, miner, 20);
    assert_eq!(chain.node_count(), 4);

    // Advance the main branch until the side block falls behind the horizon.
    extend(&mut chain, main[1], 3, miner, 30);
    assert_eq!(chain.max_height(), 6);
    assert!(!chain.contains_block(&side[0]));
    assert!(chain.contains_block(&genesis.hash()));
    assert_eq!(chain.children_of(&genesis.hash()), vec![main[0]]);
    assert!(chain.utxo_pool_at(&genesis.hash()).is_none());
}

#[test]
fn miner_round_trip() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let miner_key = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());

    let tx = pay(genesis.coinbase(), 0, &alice, &[(70, bob), (27, alice.public_key())]);
    let tx_hash = chain.add_transaction(tx);

    let miner = Miner::new(miner_key, 25);
    let block = miner.assemble_block(&chain);
    assert!(chain.add_block(block));

    let utxos = chain.max_height_utxo_pool();
    assert_eq!(utxos.balance_of(&bob), Some(70));
    assert_eq!(utxos.balance_of(&miner_key), Some(28));
    assert!(!chain.transaction_pool().contains(&tx_hash));

    // The next block builds on the new tip.
    let next = miner.assemble_block(&chain);
    assert_eq!(next.prev_hash(), Some(&chain.max_height_block().hash()));
    assert!(chain.add_block(next));
    assert_eq!(chain.max_height(), 3);
}

#[test]
fn mined_double_spend_clears_the_pool() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let miner_key = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());

    chain.add_transaction(pay(genesis.coinbase(), 0, &alice, &[(90, bob)]));
    chain.add_transaction(pay(genesis.coinbase(), 0, &alice, &[(95, bob)]));

    let miner = Miner::new(miner_key, 25);
    let block = miner.assemble_block(&chain);
    assert_eq!(block.transactions().len(), 1);
    assert!(chain.add_block(block));
    assert!(chain.transaction_pool().is_empty());

    for _ in 0..4 {
        let block = miner.assemble_block(&chain);
        assert!(block.transactions().is_empty());
        assert!(chain.add_block(block));
    }
    assert_eq!(chain.max_height(), 6);
    assert!(chain.transaction_pool().is_empty());
}

#[test]
fn side_fork_leaves_transaction_minable() {
    let alice = PrivateKey::generate();
    let bob = PrivateKey::generate().public_key();
    let miner_key = PrivateKey::generate().public_key();
    let genesis = create_genesis_block(alice.public_key(), 100);
    let mut chain = BlockChain::new(genesis.clone());
    extend(&mut chain, genesis.hash(), 2, miner_key, 10);

    let tx = pay(genesis.coinbase(), 0, &alice, &[(90, bob)]);
    chain.add_transaction(tx.clone());
    let side = Block::new(genesis.hash(), coinbase(miner_key, 50), vec![tx.clone()]);
    assert!(chain.add_block(side));

    let block = Miner::new(miner_key, 25).assemble_block(&chain);
    assert_eq!(block.transactions(), &[tx]);
    assert!(chain.add_block(block));
    assert_eq!(chain.max_height_utxo_pool().balance_of(&bob), Some(90));
}

#[test]
fn compliant_nodes_relay_and_blacklist() {
    let txs: Vec<_> = (0u8..3).map(|i| hash_bytes(&[i])).collect();

    let mut node = CompliantNode::new(3);
    node.set_followees(&[true, true, true]);
    node.set_pending_transactions(std::iter::once(txs[0]).collect());

    let sent = node.send_to_followers();
    assert!(sent.contains(&txs[0]));

    // Followee 2 stays silent.
    node.receive_from_followees(&[Candidate::new(txs[1], 0), Candidate::new(txs[2], 1)]);
    assert!(node.is_blacklisted(2));
    assert_eq!(node.pending().len(), 2);

    node.receive_from_followees(&[Candidate::new(txs[0], 2)]);
    assert!(!node.pending().contains(&txs[0]));
    assert!(node.is_blacklisted(0));
    assert!(node.is_blacklisted(1));
}
