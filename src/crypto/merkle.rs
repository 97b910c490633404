//! Merkle root over a block's transaction hashes
//!
//! Feeds the block hash so that any change to the coinbase or the
//! transaction list changes the block identity.

use super::{hash_pair, Hash};

/// Compute the merkle root of a list of hashes
///
/// An empty list yields the zero hash. Odd levels duplicate their last element.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        if current_level.len() % 2 == 1 {
            let last = current_level[current_level.len() - 1];
            current_level.push(last);
        }

        current_level = current_level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    current_level.first().copied().unwrap_or_else(Hash::zero)
}
