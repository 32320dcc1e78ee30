//! Hash primitives used throughout the ledger.
//!
//! The canonical identifier for a transaction, block, or Merkle node is a
//! "small hash": the low 160 bits of SHA-512 over the serialised bytes of
//! the value. A separate 256-bit SHA-256 digest is used only as the seed for
//! proof-of-work, matching the header-with-zeroed-nonces scheme.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Low 160 bits of SHA-512. Used for transaction ids, block ids, and Merkle
/// tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SmallHash([u8; 20]);

impl SmallHash {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Computes the small hash (low 160 bits of SHA-512) of `data`.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        let full = hasher.finalize();
        let mut low160 = [0u8; 20];
        // SHA-512 output is 64 bytes; the low 160 bits are the last 20.
        low160.copy_from_slice(&full[44..64]);
        Self(low160)
    }

    /// Combines two small hashes as Merkle siblings: `small_hash(left || right)`.
    #[must_use]
    pub fn merkle_pair(left: &Self, right: &Self) -> Self {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&left.0);
        buf.extend_from_slice(&right.0);
        Self::digest(&buf)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for SmallHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for SmallHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 256-bit SHA-256 digest, used as the proof-of-work seed over a header with
/// its nonce fields zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowSeed([u8; 32]);

impl PowSeed {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Hashes the seed together with two 32-bit nonces, as required by the
    /// momentum-style birthday search: `sha256(seed || nonce_a || nonce_b)`.
    #[must_use]
    pub fn with_nonces(&self, nonce_a: u32, nonce_b: u32) -> SmallHash {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&nonce_a.to_le_bytes());
        buf.extend_from_slice(&nonce_b.to_le_bytes());
        SmallHash::digest(&buf)
    }
}

impl fmt::Display for PowSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Low 224 bits of SHA-512, the hash width the name-registration chain uses
/// for its own header identity and proof-of-work target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TruncatedHash224([u8; 28]);

impl TruncatedHash224 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 28])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 28]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 28] {
        &self.0
    }

    /// Computes the truncated hash (low 224 bits of SHA-512) of `data`.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        let full = hasher.finalize();
        let mut low224 = [0u8; 28];
        // SHA-512 output is 64 bytes; the low 224 bits are the last 28.
        low224.copy_from_slice(&full[36..64]);
        Self(low224)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for TruncatedHash224 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl PowSeed {
    /// As [`PowSeed::with_nonces`], but producing the 224-bit hash width the
    /// name chain validates its own proof-of-work against.
    #[must_use]
    pub fn with_nonces224(&self, nonce_a: u32, nonce_b: u32) -> TruncatedHash224 {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&nonce_a.to_le_bytes());
        buf.extend_from_slice(&nonce_b.to_le_bytes());
        TruncatedHash224::digest(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_hash_is_deterministic() {
        let a = SmallHash::digest(b"hello world");
        let b = SmallHash::digest(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn small_hash_differs_on_different_input() {
        let a = SmallHash::digest(b"alice");
        let b = SmallHash::digest(b"bob");
        assert_ne!(a, b);
    }

    #[test]
    fn zero_hash_is_zero() {
        assert!(SmallHash::zero().is_zero());
        assert!(!SmallHash::digest(b"x").is_zero());
    }

    #[test]
    fn merkle_pair_is_order_sensitive() {
        let a = SmallHash::digest(b"a");
        let b = SmallHash::digest(b"b");
        assert_ne!(SmallHash::merkle_pair(&a, &b), SmallHash::merkle_pair(&b, &a));
    }

    #[test]
    fn pow_seed_nonces_change_output() {
        let seed = PowSeed::digest(b"header");
        let h1 = seed.with_nonces(0, 0);
        let h2 = seed.with_nonces(1, 0);
        assert_ne!(h1, h2);
    }
}
