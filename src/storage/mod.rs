//! Storage module - UTXO set and chain state management

mod state;
mod utxo;

pub use state::*;
pub use utxo::*;
