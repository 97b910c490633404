//! Validation module - transactions, validity rules and selection

mod handler;
mod rules;
mod transaction;

pub use handler::*;
pub use rules::*;
pub use transaction::*;
