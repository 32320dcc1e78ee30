//! Compact, recoverable ECDSA over secp256k1.
//!
//! Every signature on the wire is 65 bytes: a one-byte recovery id followed
//! by the 64-byte compact `(r, s)` pair. Because the signature is
//! recoverable, a verifier can recover the signing address directly from
//! `(digest, signature)` without the public key ever appearing on the wire.

use crate::{BlockchainError, Result};
use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length, in bytes, of a compact recoverable signature (1 recovery byte + 64).
pub const SIGNATURE_LEN: usize = 65;

/// secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey(SecretKey);

/// secp256k1 public key, stored compressed (33 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "pubkey_bytes")] Secp256k1PublicKey);

mod pubkey_bytes {
    use secp256k1::PublicKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &PublicKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(&key.serialize())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        let bytes = <Vec<u8>>::deserialize(d)?;
        PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// A 65-byte compact recoverable ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl PrivateKey {
    /// Builds a private key from its 32 raw bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes do not encode a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self(secret))
    }

    #[must_use]
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey(Secp256k1PublicKey::from_secret_key(&secp, &self.0))
    }
}

impl PublicKey {
    /// Builds a public key from its compressed (33-byte) or uncompressed
    /// (65-byte) SEC1 encoding.
    ///
    /// # Errors
    /// Returns an error if the bytes do not encode a point on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Secp256k1PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    /// Compressed SEC1 encoding (33 bytes).
    #[must_use]
    pub fn as_bytes(&self) -> [u8; 33] {
        self.0.serialize()
    }

    /// The address derived from this public key: `ripemd160(sha256(pubkey))`,
    /// the same pipeline used for legacy signature-claim addresses.
    #[must_use]
    pub fn address_hash(&self) -> [u8; 20] {
        hash160(&self.as_bytes())
    }

    /// Exposes the underlying secp256k1 point, for use by key-derivation code
    /// in this crate.
    #[must_use]
    pub(crate) const fn inner(&self) -> &Secp256k1PublicKey {
        &self.0
    }

    /// Wraps a secp256k1 point, for use by key-derivation code in this crate.
    #[must_use]
    pub(crate) const fn from_inner(key: Secp256k1PublicKey) -> Self {
        Self(key)
    }
}

/// `ripemd160(sha256(data))`, the standard pay-to-pubkey-hash pipeline.
#[must_use]
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

impl KeyPair {
    /// Generates a fresh keypair using the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (secret, public) = secp.generate_keypair(&mut rng);
        KeyPair {
            public_key: PublicKey(public),
            private_key: PrivateKey(secret),
        }
    }

    /// Signs a 32-byte digest, producing a recoverable compact signature.
    ///
    /// # Errors
    /// Returns an error if the digest is not exactly 32 bytes.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Signature> {
        sign_digest(digest, &self.private_key)
    }
}

/// Signs a 32-byte digest with the given private key.
///
/// # Errors
/// Propagates any secp256k1 signing failure (never expected for a valid key).
pub fn sign_digest(digest: &[u8; 32], key: &PrivateKey) -> Result<Signature> {
    let secp = Secp256k1::new();
    let msg = Message::from_digest_slice(digest)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let sig = secp.sign_ecdsa_recoverable(&msg, &key.0);
    let (recovery_id, compact) = sig.serialize_compact();
    let mut bytes = [0u8; SIGNATURE_LEN];
    bytes[0] = recovery_id.to_i32() as u8;
    bytes[1..].copy_from_slice(&compact);
    Ok(Signature(bytes))
}

/// Signs a transaction digest with the given keypair.
///
/// # Errors
/// Propagates any underlying signing failure.
pub fn sign_transaction_hash(digest: &[u8; 32], keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(digest)
}

/// Recovers the signing public key from a digest and signature.
///
/// # Errors
/// Returns an error if the signature is malformed or does not recover.
pub fn recover_public_key(digest: &[u8; 32], signature: &Signature) -> Result<PublicKey> {
    let secp = Secp256k1::new();
    let msg = Message::from_digest_slice(digest)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let recovery_id = RecoveryId::from_i32(i32::from(signature.0[0]))
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&signature.0[1..], recovery_id)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    let pubkey = secp
        .recover_ecdsa(&msg, &recoverable)
        .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
    Ok(PublicKey(pubkey))
}

/// Recovers the signing address (not the public key) from a digest and
/// signature, for claim rules that check against an address rather than a
/// raw key.
///
/// # Errors
/// Returns an error if recovery fails.
pub fn recover_address(digest: &[u8; 32], signature: &Signature) -> Result<[u8; 20]> {
    Ok(recover_public_key(digest, signature)?.address_hash())
}

/// Verifies that `signature` recovers to `expected_address` for `digest`.
///
/// # Errors
/// Returns an error if recovery fails; returns `Ok(false)` (not an error) if
/// recovery succeeds but the recovered address does not match.
pub fn verify_transaction_signature(
    digest: &[u8; 32],
    signature: &Signature,
    expected_address: &[u8; 20],
) -> Result<bool> {
    let recovered = recover_address(digest, signature)?;
    Ok(&recovered == expected_address)
}

impl Signature {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Builds a signature from its raw 65-byte wire encoding.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly [`SIGNATURE_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(BlockchainError::InvalidKeySize {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

/// Builds a signature from its raw 65-byte wire encoding.
///
/// # Errors
/// Returns an error if `bytes` is not exactly [`SIGNATURE_LEN`] long.
pub fn signature_from_bytes(bytes: &[u8]) -> Result<Signature> {
    Signature::from_bytes(bytes)
}

/// Builds a public key from raw bytes.
///
/// # Errors
/// Returns an error if the bytes do not encode a point on the curve.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_round_trip() {
        let keypair = KeyPair::generate();
        let digest = Sha256::digest(b"a transaction body").into();
        let signature = keypair.sign(&digest).unwrap();

        let address = keypair.public_key.address_hash();
        assert!(verify_transaction_signature(&digest, &signature, &address).unwrap());
    }

    #[test]
    fn recovered_address_does_not_match_wrong_key() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = Sha256::digest(b"payload").into();
        let signature = keypair.sign(&digest).unwrap();

        let wrong_address = other.public_key.address_hash();
        assert!(!verify_transaction_signature(&digest, &signature, &wrong_address).unwrap());
    }

    #[test]
    fn signature_round_trips_through_bytes() {
        let keypair = KeyPair::generate();
        let digest = Sha256::digest(b"round trip").into();
        let signature = keypair.sign(&digest).unwrap();
        let reparsed = signature_from_bytes(signature.as_bytes()).unwrap();
        assert_eq!(signature, reparsed);
    }

    #[test]
    fn rejects_wrong_length_signature() {
        assert!(signature_from_bytes(&[0u8; 10]).is_err());
    }
}
