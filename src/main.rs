//! Forkchain demo node
//!
//! Runs a single in-process chain with a transaction producer and a miner
//! sharing it. Pass a JSON config path as the first argument or in
//! `FORKCHAIN_CONFIG`; `RUST_LOG` overrides the configured log level.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use forkchain::config::LedgerConfig;
use forkchain::crypto::{PrivateKey, PublicKey};
use forkchain::mining::Miner;
use forkchain::node::{create_genesis_block, GenesisInfo};
use forkchain::storage::{BlockChain, OutPoint};
use forkchain::validation::{Amount, Transaction};
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Value of the genesis allocation in the demo
const GENESIS_ALLOCATION: Amount = 1_000;

/// Stop after this many mined blocks
const DEMO_BLOCKS: u64 = 20;

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("forkchain-node: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level);

    let treasury = PrivateKey::generate();
    let miner_key = PrivateKey::generate();
    let payee = PrivateKey::generate().public_key();

    let genesis = create_genesis_block(treasury.public_key(), GENESIS_ALLOCATION);
    if let Some(info) = GenesisInfo::from_block(&genesis) {
        info!(
            hash = %info.hash,
            owner = %info.owner,
            allocation = info.allocation,
            "created genesis block"
        );
    }

    let chain = Arc::new(Mutex::new(BlockChain::with_config(genesis, &config)));
    let miner = Miner::new(miner_key.public_key(), config.block_reward);

    let producer = tokio::spawn(produce_transactions(Arc::clone(&chain), treasury, payee));
    let mining = tokio::spawn(mine_blocks(Arc::clone(&chain), miner));

    tokio::select! {
        result = mining => {
            if let Err(e) = result {
                error!("miner task failed: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    producer.abort();

    let chain = chain.lock();
    let stats = chain.get_stats();
    info!(
        height = stats.height,
        tip = %stats.tip_hash,
        nodes = stats.node_count,
        utxos = stats.utxo_count,
        pending = stats.pending_transactions,
        miner_balance = chain.max_height_utxo_pool().balance_of(&miner_key.public_key()).unwrap_or(0),
        "node stopped"
    );
}

fn load_config() -> Result<LedgerConfig, forkchain::config::ConfigError> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FORKCHAIN_CONFIG").ok());
    match path {
        Some(path) => LedgerConfig::load(path),
        None => Ok(LedgerConfig::default()),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

/// Periodically pay a random amount from `treasury` to `payee`
async fn produce_transactions(chain: Arc<Mutex<BlockChain>>, treasury: PrivateKey, payee: PublicKey) {
    let mut ticker = interval(Duration::from_millis(150));
    loop {
        ticker.tick().await;

        let chain = chain.lock();
        let pool = chain.transaction_pool();
        let claimed: HashSet<OutPoint> = pool
            .transactions()
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint()))
            .collect();

        let utxos = chain.max_height_utxo_pool();
        let Some((outpoint, output)) = utxos
            .get_by_owner(&treasury.public_key())
            .into_iter()
            .filter(|(outpoint, _)| !claimed.contains(outpoint))
            .max_by_key(|(_, output)| output.value)
        else {
            debug!("no spendable treasury output");
            continue;
        };

        let mut rng = rand::thread_rng();
        let amount: Amount = rng.gen_range(1..=20);
        let fee: Amount = rng.gen_range(0..=3);
        if output.value < amount + fee {
            warn!(available = output.value, "treasury exhausted");
            continue;
        }

        let mut tx = Transaction::new(vec![], vec![]);
        tx.add_input(outpoint.tx_hash, outpoint.index);
        tx.add_output(amount, payee);
        tx.add_output(output.value - amount - fee, treasury.public_key());
        tx.sign_input(0, &treasury);

        let hash = chain.add_transaction(tx);
        debug!(tx = %hash.short(), amount, fee, "submitted payment");
    }
}

/// Assemble and apply a block on the current tip at a fixed interval
async fn mine_blocks(chain: Arc<Mutex<BlockChain>>, miner: Miner) {
    let mut ticker = interval(Duration::from_millis(500));
    ticker.tick().await;
    loop {
        ticker.tick().await;

        let mut chain = chain.lock();
        let block = miner.assemble_block(&*chain);
        let hash = block.hash();
        match chain.try_add_block(block) {
            Ok(_) => info!(
                height = chain.max_height(),
                %hash,
                pending = chain.transaction_pool().len(),
                "mined block"
            ),
            Err(e) => error!("assembled block rejected: {e}"),
        }

        if chain.max_height() > DEMO_BLOCKS {
            info!(blocks = DEMO_BLOCKS, "demo complete");
            return;
        }
    }
}
