//! P2P module - follower-graph relay consensus

mod compliant;

pub use compliant::*;
