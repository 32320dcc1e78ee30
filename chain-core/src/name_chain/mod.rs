//! The name-registration chain: headers, claims, genesis, and the
//! difficulty accounting that feeds the miner in [`miner`].
//!
//! This is a second, independent proof-of-work chain from the UTXO chain in
//! [`crate::block`]. It shares the ledger's Merkle/PoW idiom but commits to
//! name claims instead of asset transfers, and validates its own header
//! against a 224-bit hash width rather than the UTXO chain's 160-bit one.

pub mod miner;

use serde::{Deserialize, Serialize};

use chain_primitives::{difficulty160, difficulty224, PowSeed, SmallHash, TruncatedHash224};

use crate::error::ChainError;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

/// A single name registration or renewal, bundled into a [`NameBlock`].
///
/// `prev_owner_trx` chains a name's registration history: it is the id of
/// the [`NameTrx`] that most recently claimed `name_hash`, or the zero hash
/// for a first-time registration. `nonce` is the proof-of-work this
/// individual claim contributes to the block's total difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTrx {
    pub name_hash: SmallHash,
    pub owner: [u8; 20],
    pub prev_owner_trx: SmallHash,
    pub nonce: u64,
}

impl NameTrx {
    #[must_use]
    pub fn id(&self) -> SmallHash {
        SmallHash::digest(&self.to_bytes())
    }

    /// The difficulty this claim contributes toward its block's total, via
    /// the same 160-bit threshold the UTXO chain uses for transaction ids.
    #[must_use]
    pub fn difficulty(&self) -> u64 {
        difficulty160(&self.id())
    }
}

impl Pack for NameTrx {
    fn pack(&self, w: &mut Writer) {
        w.fixed_bytes(self.name_hash.as_bytes());
        w.fixed_bytes(&self.owner);
        w.fixed_bytes(self.prev_owner_trx.as_bytes());
        w.u64(self.nonce);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let name_hash = SmallHash::from_bytes(r.fixed_bytes()?);
        let owner = r.fixed_bytes()?;
        let prev_owner_trx = SmallHash::from_bytes(r.fixed_bytes()?);
        let nonce = r.u64()?;
        Ok(Self {
            name_hash,
            owner,
            prev_owner_trx,
            nonce,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHeader {
    pub prev: TruncatedHash224,
    pub block_num: u64,
    pub timestamp: i64,
    pub trx_merkle_root: SmallHash,
    pub noncea: u32,
    pub nonceb: u32,
}

impl NameHeader {
    fn pack_fields(&self, w: &mut Writer, noncea: u32, nonceb: u32) {
        w.fixed_bytes(self.prev.as_bytes());
        w.u64(self.block_num);
        w.i64(self.timestamp);
        w.fixed_bytes(self.trx_merkle_root.as_bytes());
        w.u32(noncea);
        w.u32(nonceb);
    }

    /// The header's own id: the 224-bit truncated hash of the fully
    /// serialised header, including its nonces.
    #[must_use]
    pub fn id(&self) -> TruncatedHash224 {
        TruncatedHash224::digest(&self.to_bytes())
    }

    /// The proof-of-work seed: the header with both nonce fields zeroed.
    #[must_use]
    pub fn pow_seed(&self) -> PowSeed {
        let mut w = Writer::new();
        self.pack_fields(&mut w, 0, 0);
        PowSeed::digest(&w.into_vec())
    }

    /// The proof-of-work hash the miner searches nonces against.
    #[must_use]
    pub fn pow_hash(&self) -> TruncatedHash224 {
        self.pow_seed().with_nonces224(self.noncea, self.nonceb)
    }

    #[must_use]
    pub fn difficulty(&self) -> u64 {
        difficulty224(self.pow_hash().as_bytes())
    }

    /// Checks that this header's proof-of-work meets `min_difficulty`.
    ///
    /// # Errors
    /// Returns an error if the computed difficulty is below the minimum.
    pub fn validate_work(&self, min_difficulty: u64) -> Result<()> {
        if self.difficulty() < min_difficulty {
            return Err(ChainError::InvalidProofOfWork);
        }
        Ok(())
    }
}

impl Pack for NameHeader {
    fn pack(&self, w: &mut Writer) {
        self.pack_fields(w, self.noncea, self.nonceb);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let prev = TruncatedHash224::from_bytes(r.fixed_bytes()?);
        let block_num = r.u64()?;
        let timestamp = r.i64()?;
        let trx_merkle_root = SmallHash::from_bytes(r.fixed_bytes()?);
        let noncea = r.u32()?;
        let nonceb = r.u32()?;
        Ok(Self {
            prev,
            block_num,
            timestamp,
            trx_merkle_root,
            noncea,
            nonceb,
        })
    }
}

/// A name-chain header paired with the claims it commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameBlock {
    pub header: NameHeader,
    pub trxs: Vec<NameTrx>,
}

impl NameBlock {
    #[must_use]
    pub fn id(&self) -> TruncatedHash224 {
        self.header.id()
    }

    pub fn validate_merkle_root(&self) -> Result<()> {
        if name_merkle_root(&self.trxs) != self.header.trx_merkle_root {
            return Err(ChainError::BadMerkleRoot);
        }
        Ok(())
    }

    /// The total difficulty this block contributes to the name chain: the
    /// header's own proof-of-work plus the sum of every bundled claim's
    /// individual difficulty. A block with no claims has no difficulty of
    /// its own to sum, so it falls back to half the header's difficulty
    /// rather than reporting zero.
    #[must_use]
    pub fn block_difficulty(&self) -> u64 {
        let header_difficulty = self.header.difficulty();
        let trx_sum: u64 = self
            .trxs
            .iter()
            .map(NameTrx::difficulty)
            .fold(0u64, u64::saturating_add);
        if trx_sum == 0 {
            header_difficulty / 2
        } else {
            header_difficulty.saturating_add(trx_sum)
        }
    }
}

impl Pack for NameBlock {
    fn pack(&self, w: &mut Writer) {
        self.header.pack(w);
        w.u32(self.trxs.len() as u32);
        for trx in &self.trxs {
            trx.pack(w);
        }
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let header = NameHeader::unpack(r)?;
        let count = r.u32()? as usize;
        let mut trxs = Vec::with_capacity(count);
        for _ in 0..count {
            trxs.push(NameTrx::unpack(r)?);
        }
        Ok(Self { header, trxs })
    }
}

/// Merkle root over name claims, identified by their ids. Mirrors
/// [`crate::block::merkle_root`]'s zero-padding of an odd trailing node.
#[must_use]
pub fn name_merkle_root(trxs: &[NameTrx]) -> SmallHash {
    if trxs.is_empty() {
        return SmallHash::zero();
    }
    let mut level: Vec<SmallHash> = trxs.iter().map(NameTrx::id).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).copied().unwrap_or_else(SmallHash::zero);
            next.push(SmallHash::merkle_pair(&pair[0], &right));
        }
        level = next;
    }
    level[0]
}

/// The name chain's genesis block: a fixed timestamp, a zero name hash
/// (nothing registered yet), and no bundled claims. It does not share a
/// genesis with the UTXO chain in [`crate::genesis`].
#[must_use]
pub fn genesis_name_block() -> NameBlock {
    let header = NameHeader {
        prev: TruncatedHash224::zero(),
        block_num: 0,
        timestamp: 1_231_006_505,
        trx_merkle_root: SmallHash::zero(),
        noncea: 0,
        nonceb: 0,
    };
    NameBlock {
        header,
        trxs: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trx(nonce: u64) -> NameTrx {
        NameTrx {
            name_hash: SmallHash::digest(b"alice"),
            owner: [1u8; 20],
            prev_owner_trx: SmallHash::zero(),
            nonce,
        }
    }

    #[test]
    fn name_trx_wire_round_trips() {
        let trx = sample_trx(7);
        let bytes = trx.to_bytes();
        assert_eq!(NameTrx::from_bytes(&bytes).unwrap(), trx);
    }

    #[test]
    fn header_id_changes_with_nonce() {
        let header = NameHeader {
            prev: TruncatedHash224::zero(),
            block_num: 1,
            timestamp: 0,
            trx_merkle_root: SmallHash::zero(),
            noncea: 0,
            nonceb: 0,
        };
        let mut other = header;
        other.noncea = 1;
        assert_ne!(header.id(), other.id());
    }

    #[test]
    fn empty_block_difficulty_is_half_header_difficulty() {
        let block = genesis_name_block();
        assert_eq!(
            block.block_difficulty(),
            block.header.difficulty() / 2
        );
    }

    #[test]
    fn bundled_claims_add_to_header_difficulty() {
        let mut block = genesis_name_block();
        block.trxs.push(sample_trx(1));
        block.header.trx_merkle_root = name_merkle_root(&block.trxs);
        assert!(block.block_difficulty() > block.header.difficulty());
    }

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(genesis_name_block(), genesis_name_block());
    }

    #[test]
    fn block_wire_round_trip() {
        let mut block = genesis_name_block();
        block.trxs.push(sample_trx(3));
        block.header.trx_merkle_root = name_merkle_root(&block.trxs);
        let bytes = block.to_bytes();
        assert_eq!(NameBlock::from_bytes(&bytes).unwrap(), block);
        block.validate_merkle_root().unwrap();
    }
}
