//! BIP32-style hierarchical deterministic key derivation over secp256k1.
//!
//! Child keys are derived as `I = SHA512(pub || index_be32)`;
//! `child.pub = parent.pub + I_left * G` and `child.chain = I_right`. Private
//! derivation mirrors this using `0x00 || priv` in place of `pub`.

use crate::crypto::{PrivateKey, PublicKey};
use crate::{BlockchainError, Result};
use secp256k1::{Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// A public key plus the chain code needed to derive its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPublicKey {
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
}

/// A private key plus the chain code needed to derive its children.
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    pub private_key: PrivateKey,
    pub chain_code: [u8; 32],
}

fn hmac_like_split(public_bytes: &[u8], index: u32) -> ([u8; 32], [u8; 32]) {
    let mut hasher = Sha512::new();
    hasher.update(public_bytes);
    hasher.update(index.to_be_bytes());
    let digest = hasher.finalize();
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&digest[..32]);
    right.copy_from_slice(&digest[32..]);
    (left, right)
}

impl ExtendedPublicKey {
    #[must_use]
    pub const fn new(public_key: PublicKey, chain_code: [u8; 32]) -> Self {
        Self {
            public_key,
            chain_code,
        }
    }

    /// Derives the public child at `index` without knowledge of any private
    /// key.
    ///
    /// # Errors
    /// Returns an error if the derived tweak is out of range (cryptographically
    /// negligible) or does not produce a valid curve point.
    pub fn child(&self, index: u32) -> Result<Self> {
        let (i_left, i_right) = hmac_like_split(&self.public_key.as_bytes(), index);
        let secp = Secp256k1::new();
        let scalar = Scalar::from_be_bytes(i_left)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let child_point = self
            .public_key
            .inner()
            .add_exp_tweak(&secp, &scalar)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self {
            public_key: PublicKey::from_inner(child_point),
            chain_code: i_right,
        })
    }
}

impl ExtendedPrivateKey {
    #[must_use]
    pub fn new(private_key: PrivateKey, chain_code: [u8; 32]) -> Self {
        Self {
            private_key,
            chain_code,
        }
    }

    /// Derives a master extended private key from an arbitrary-length seed.
    #[must_use]
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(b"chain seed");
        hasher.update(seed);
        let digest = hasher.finalize();
        let mut key_bytes = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key_bytes.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
        let private_key = PrivateKey::from_bytes(&key_bytes)
            .expect("HMAC-derived scalar is always in range with overwhelming probability");
        Self::new(private_key, chain_code)
    }

    /// Derives the private child at `index` using the private-mode variant:
    /// `I = SHA512(0x00 || priv || index_be32)`.
    ///
    /// # Errors
    /// Returns an error if the derived tweak is out of range or the combined
    /// scalar is invalid (both cryptographically negligible).
    pub fn child(&self, index: u32) -> Result<Self> {
        let mut prefixed = Vec::with_capacity(33);
        prefixed.push(0u8);
        prefixed.extend_from_slice(&self.private_key.as_bytes());
        let (i_left, i_right) = hmac_like_split(&prefixed, index);

        let scalar = Scalar::from_be_bytes(i_left)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let parent_secret = SecretKey::from_slice(&self.private_key.as_bytes())
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let child_secret = parent_secret
            .add_tweak(&scalar)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;

        Ok(Self {
            private_key: PrivateKey::from_bytes(&child_secret.secret_bytes())?,
            chain_code: i_right,
        })
    }

    #[must_use]
    pub fn public(&self) -> ExtendedPublicKey {
        ExtendedPublicKey::new(self.private_key.public_key(), self.chain_code)
    }
}
