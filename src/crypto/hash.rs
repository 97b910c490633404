//! BLAKE3 hashing implementation
//!
//! All hashing in the ledger uses BLAKE3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte hash output
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a zero hash (stands in for a missing previous hash)
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Create hash from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hash arbitrary bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash(*hash.as_bytes())
}

/// Hash two hashes together (for Merkle tree)
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&left.0);
    hasher.update(&right.0);
    Hash(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = hash_bytes(b"test");
        let recovered = Hash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, recovered);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hash_pair_order_matters() {
        let left = hash_bytes(b"left");
        let right = hash_bytes(b"right");
        assert_eq!(hash_pair(&left, &right), hash_pair(&left, &right));
        assert_ne!(hash_pair(&left, &right), hash_pair(&right, &left));
    }

    #[test]
    fn test_hash_ordering_is_bytewise() {
        let low = Hash([0u8; 32]);
        let mut high_bytes = [0u8; 32];
        high_bytes[0] = 1;
        assert!(low < Hash(high_bytes));
    }
}
