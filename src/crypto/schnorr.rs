//! Schnorr signature implementation
//!
//! Uses the secp256k1 curve with BIP-340 Schnorr signatures. The ledger only
//! consumes verification through the [`SignatureVerifier`] capability; key
//! generation and signing exist so transactions can be built and tested.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// 32-byte private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 32-byte public key (x-only for Schnorr). Doubles as the owner address of
/// an output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "pubkey_serde")] pub [u8; 32]);

/// 64-byte Schnorr signature
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature(#[serde(with = "sig_serde")] pub [u8; 64]);

mod pubkey_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid public key length"))
    }
}

mod sig_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid signature length"))
    }
}

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_bytes(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes().into())
    }

    /// Sign an arbitrary payload
    pub fn sign(&self, payload: &[u8]) -> SchnorrSignature {
        let signature: Signature = self.0.sign(payload);
        SchnorrSignature(signature.to_bytes())
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    /// Create from 32 bytes, rejecting points that are not on the curve
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        VerifyingKey::from_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(PublicKey(*bytes))
    }

    /// Verify a signature over `payload`
    pub fn verify(&self, payload: &[u8], signature: &SchnorrSignature) -> bool {
        let verifying_key = match VerifyingKey::from_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match Signature::try_from(signature.0.as_slice()) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(payload, &sig).is_ok()
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl SchnorrSignature {
    /// Placeholder signature for unsigned inputs
    pub const fn empty() -> Self {
        SchnorrSignature([0u8; 64])
    }

    /// Create from 64 bytes
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        SchnorrSignature(*bytes)
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl std::fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// Signature verification capability consumed by transaction validation.
///
/// Implementations must be synchronous and side-effect free.
pub trait SignatureVerifier {
    fn verify(&self, owner: &PublicKey, payload: &[u8], signature: &SchnorrSignature) -> bool;
}

/// BIP-340 Schnorr verification over secp256k1
#[derive(Debug, Clone, Copy, Default)]
pub struct SchnorrVerifier;

impl SignatureVerifier for SchnorrVerifier {
    fn verify(&self, owner: &PublicKey, payload: &[u8], signature: &SchnorrSignature) -> bool {
        owner.verify(payload, signature)
    }
}

impl<V: SignatureVerifier + ?Sized> SignatureVerifier for &V {
    fn verify(&self, owner: &PublicKey, payload: &[u8], signature: &SchnorrSignature) -> bool {
        (**self).verify(owner, payload, signature)
    }
}
