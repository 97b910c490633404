//! Consensus module - block structure

mod block;

pub use block::*;
