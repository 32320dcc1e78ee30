//! Difficulty accounting.
//!
//! A hash's difficulty is `floor((2^n - 1) / H)` where `n` is the hash's bit
//! width (160 for a [`SmallHash`](crate::hash::SmallHash), 224 for the
//! truncated hashes used by the name chain) and `H` is the hash read as a
//! big-endian unsigned integer. The numerator does not fit in a `u128`, so
//! the division is carried out over a 256-bit unsigned integer.

use crate::hash::SmallHash;
use primitive_types::U256;

/// `2^160 - 1`, the maximum value a 160-bit hash can take.
fn max160() -> U256 {
    (U256::one() << 160) - U256::one()
}

/// `2^224 - 1`, the maximum value a 224-bit hash can take.
fn max224() -> U256 {
    (U256::one() << 224) - U256::one()
}

fn be_bytes_to_u256(bytes: &[u8]) -> U256 {
    U256::from_big_endian(bytes)
}

/// Difficulty of a 160-bit (20-byte) small hash.
#[must_use]
pub fn difficulty160(hash: &SmallHash) -> u64 {
    let h = be_bytes_to_u256(hash.as_bytes());
    if h.is_zero() {
        return u64::MAX;
    }
    let d = max160() / h;
    saturate_u64(d)
}

/// Difficulty of a 224-bit (28-byte) hash, as used by the name chain.
#[must_use]
pub fn difficulty224(hash: &[u8; 28]) -> u64 {
    let h = be_bytes_to_u256(hash);
    if h.is_zero() {
        return u64::MAX;
    }
    let d = max224() / h;
    saturate_u64(d)
}

fn saturate_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_has_max_difficulty() {
        assert_eq!(difficulty160(&SmallHash::zero()), u64::MAX);
        assert_eq!(difficulty224(&[0u8; 28]), u64::MAX);
    }

    #[test]
    fn difficulty_is_monotonic_decreasing() {
        let small = SmallHash::from_bytes([0u8; 20]);
        let mut bigger_bytes = [0u8; 20];
        bigger_bytes[19] = 1;
        let bigger = SmallHash::from_bytes(bigger_bytes);
        let mut biggest_bytes = [0u8; 20];
        biggest_bytes[0] = 0xff;
        let biggest = SmallHash::from_bytes(biggest_bytes);

        assert!(difficulty160(&small) > difficulty160(&bigger));
        assert!(difficulty160(&bigger) > difficulty160(&biggest));
    }

    #[test]
    fn max_hash_has_minimal_difficulty() {
        let max_hash = SmallHash::from_bytes([0xffu8; 20]);
        assert_eq!(difficulty160(&max_hash), 1);
    }
}
