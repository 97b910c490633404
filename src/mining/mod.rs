//! Mining module - pending pool and block assembly

mod miner;
mod pool;

pub use miner::*;
pub use pool::*;
