//! Base58 address encoding: extended (pubkey + chain code) addresses and
//! legacy PTS (ProtoShares) signature addresses.

use crate::extended_key::ExtendedPublicKey;
use crate::hash::SmallHash;
use crate::{BlockchainError, PublicKey, Result};
use sha2::{Digest, Sha512};

/// Version byte for a compressed legacy PTS address.
pub const PTS_VERSION_COMPRESSED: u8 = 56;
/// Version byte for an uncompressed legacy PTS address.
pub const PTS_VERSION_UNCOMPRESSED: u8 = 0;

/// 4-byte checksum: the low 32 bits of the small hash of the payload.
fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = SmallHash::digest(payload);
    let bytes = digest.as_bytes();
    [bytes[16], bytes[17], bytes[18], bytes[19]]
}

fn low32_of_hash64(payload: &[u8]) -> [u8; 4] {
    let mut hasher = Sha512::new();
    hasher.update(payload);
    let digest = hasher.finalize();
    [digest[60], digest[61], digest[62], digest[63]]
}

fn encode_with_checksum(payload: &[u8], check: [u8; 4]) -> String {
    let mut buf = Vec::with_capacity(payload.len() + 4);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&check);
    bs58::encode(buf).into_string()
}

fn decode_with_checksum(text: &str, checksum_fn: impl Fn(&[u8]) -> [u8; 4]) -> Result<Vec<u8>> {
    let raw = bs58::decode(text)
        .into_vec()
        .map_err(|e| BlockchainError::SerializationError(e.to_string()))?;
    if raw.len() < 4 {
        return Err(BlockchainError::InvalidHash);
    }
    let (payload, check) = raw.split_at(raw.len() - 4);
    if checksum_fn(payload) == check {
        Ok(payload.to_vec())
    } else {
        Err(BlockchainError::InvalidHash)
    }
}

/// Encodes an extended public key as `base58(pub33 || chain32 || checksum4)`.
#[must_use]
pub fn encode_extended_address(key: &ExtendedPublicKey) -> String {
    let mut payload = Vec::with_capacity(65);
    payload.extend_from_slice(&key.public_key.as_bytes());
    payload.extend_from_slice(&key.chain_code);
    let check = low32_of_hash64(&payload);
    encode_with_checksum(&payload, check)
}

/// Decodes a base58 extended address back into its public key and chain code.
///
/// # Errors
/// Returns an error if the base58 is malformed, the checksum fails, or the
/// embedded public key does not decode to a valid curve point.
pub fn decode_extended_address(text: &str) -> Result<ExtendedPublicKey> {
    let payload = decode_with_checksum(text, low32_of_hash64)?;
    if payload.len() != 65 {
        return Err(BlockchainError::InvalidKeySize {
            expected: 65,
            actual: payload.len(),
        });
    }
    let public_key = PublicKey::from_bytes(&payload[..33])?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&payload[33..]);
    Ok(ExtendedPublicKey::new(public_key, chain_code))
}

/// Encodes a legacy PTS address: `base58(version || hash160(pubkey) || checksum4)`.
#[must_use]
pub fn encode_pts_address(public_key: &PublicKey, compressed: bool) -> String {
    let version = if compressed {
        PTS_VERSION_COMPRESSED
    } else {
        PTS_VERSION_UNCOMPRESSED
    };
    let hash = public_key.address_hash();
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(&hash);
    let check = checksum(&payload);
    encode_with_checksum(&payload, check)
}

/// Decodes a legacy PTS address into its version byte and address hash.
///
/// # Errors
/// Returns an error if the base58 is malformed or the checksum fails.
pub fn decode_pts_address(text: &str) -> Result<(u8, [u8; 20])> {
    let payload = decode_with_checksum(text, checksum)?;
    if payload.len() != 21 {
        return Err(BlockchainError::InvalidKeySize {
            expected: 21,
            actual: payload.len(),
        });
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extended_key::ExtendedPrivateKey;
    use crate::crypto::KeyPair;

    #[test]
    fn extended_address_round_trips() {
        let master = ExtendedPrivateKey::from_seed(b"address test seed");
        let extended_pub = master.public();
        let encoded = encode_extended_address(&extended_pub);
        let decoded = decode_extended_address(&encoded).unwrap();
        assert_eq!(decoded.public_key, extended_pub.public_key);
        assert_eq!(decoded.chain_code, extended_pub.chain_code);
    }

    #[test]
    fn pts_address_round_trips_both_forms() {
        let keypair = KeyPair::generate();
        for compressed in [true, false] {
            let encoded = encode_pts_address(&keypair.public_key, compressed);
            let (version, hash) = decode_pts_address(&encoded).unwrap();
            assert_eq!(hash, keypair.public_key.address_hash());
            let expected_version = if compressed {
                PTS_VERSION_COMPRESSED
            } else {
                PTS_VERSION_UNCOMPRESSED
            };
            assert_eq!(version, expected_version);
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let keypair = KeyPair::generate();
        let mut encoded = encode_pts_address(&keypair.public_key, true);
        encoded.push('z');
        assert!(decode_pts_address(&encoded).is_err());
    }
}
