//! Node module - chain bootstrap

mod genesis;

pub use genesis::*;
