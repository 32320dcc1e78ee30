//! The persistent UTXO store: ordered key-value indices backed by RocksDB.
//!
//! One column family per index named in the data model: transaction and
//! block lookup tables, the address index, and the spent-marker index. Every
//! mutation a block applies goes through a single [`rocksdb::WriteBatch`] so
//! that `push_block`/`pop_block` commit atomically.

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;

use chain_primitives::SmallHash;

use crate::error::ChainError;
use crate::transaction::{OutputRef, Transaction};
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

const CF_BLOCKS: &str = "blocks";
const CF_BLOCK_IDS: &str = "block_ids";
const CF_TRX_IDS: &str = "trx_ids";
const CF_TRXS: &str = "trxs";
const CF_ADDRESSES: &str = "addresses";
const CF_SPENT: &str = "spent";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_BLOCKS,
    CF_BLOCK_IDS,
    CF_TRX_IDS,
    CF_TRXS,
    CF_ADDRESSES,
    CF_SPENT,
];

/// Locates a transaction within the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxNum {
    pub block_num: u64,
    pub trx_idx: u32,
}

impl TrxNum {
    #[must_use]
    pub const fn new(block_num: u64, trx_idx: u32) -> Self {
        Self { block_num, trx_idx }
    }

    fn to_key(self) -> [u8; 12] {
        let mut key = [0u8; 12];
        key[..8].copy_from_slice(&self.block_num.to_be_bytes());
        key[8..].copy_from_slice(&self.trx_idx.to_be_bytes());
        key
    }

    fn from_key(bytes: &[u8]) -> Self {
        let mut block_num_bytes = [0u8; 8];
        let mut trx_idx_bytes = [0u8; 4];
        block_num_bytes.copy_from_slice(&bytes[..8]);
        trx_idx_bytes.copy_from_slice(&bytes[8..12]);
        Self {
            block_num: u64::from_be_bytes(block_num_bytes),
            trx_idx: u32::from_be_bytes(trx_idx_bytes),
        }
    }
}

impl Pack for TrxNum {
    fn pack(&self, w: &mut Writer) {
        w.u64(self.block_num);
        w.u32(self.trx_idx);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let block_num = r.u64()?;
        let trx_idx = r.u32()?;
        Ok(Self { block_num, trx_idx })
    }
}

/// A stored transaction alongside where it lives in the chain and which of
/// its outputs have been spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaTrx {
    pub trx: Transaction,
    pub trx_num: TrxNum,
}

impl Pack for MetaTrx {
    fn pack(&self, w: &mut Writer) {
        self.trx.pack(w);
        self.trx_num.pack(w);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let trx = Transaction::unpack(r)?;
        let trx_num = TrxNum::unpack(r)?;
        Ok(Self { trx, trx_num })
    }
}

/// Identifies the spender of a previously-unspent output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpentBy {
    pub trx_num: TrxNum,
    pub input_idx: u32,
}

impl Pack for SpentBy {
    fn pack(&self, w: &mut Writer) {
        self.trx_num.pack(w);
        w.u32(self.input_idx);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let trx_num = TrxNum::unpack(r)?;
        let input_idx = r.u32()?;
        Ok(Self {
            trx_num,
            input_idx,
        })
    }
}

fn pack_output_refs(refs: &[OutputRef]) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(refs.len() as u32);
    for r in refs {
        r.pack(&mut w);
    }
    w.into_vec()
}

fn unpack_output_refs(bytes: &[u8]) -> Result<Vec<OutputRef>> {
    let mut r = Reader::new(bytes);
    let count = r.u32()? as usize;
    let mut refs = Vec::with_capacity(count);
    for _ in 0..count {
        refs.push(OutputRef::unpack(&mut r)?);
    }
    Ok(refs)
}

/// The persistent ordered-index UTXO store.
pub struct UtxoStore {
    db: DB,
}

impl UtxoStore {
    /// Opens (creating if absent) the UTXO store at `path`.
    ///
    /// # Errors
    /// Returns an error if the RocksDB database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ChainError::Storage(format!("missing column family {name}")))
    }

    /// Looks up a transaction by id.
    ///
    /// # Errors
    /// Returns an error on storage failure or if the id is unknown.
    pub fn fetch_trx_by_id(&self, trx_id: &SmallHash) -> Result<MetaTrx> {
        let trx_num_bytes = self
            .db
            .get_cf(self.cf(CF_TRX_IDS)?, trx_id.as_bytes())
            .map_err(|e| ChainError::Storage(e.to_string()))?
            .ok_or_else(|| ChainError::TransactionNotFound(trx_id.to_string()))?;
        let trx_num = TrxNum::from_key(&trx_num_bytes);
        self.fetch_trx(trx_num)
    }

    /// Looks up a transaction by its chain position.
    ///
    /// # Errors
    /// Returns an error on storage failure or if the position is unknown.
    pub fn fetch_trx(&self, trx_num: TrxNum) -> Result<MetaTrx> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_TRXS)?, trx_num.to_key())
            .map_err(|e| ChainError::Storage(e.to_string()))?
            .ok_or_else(|| {
                ChainError::TransactionNotFound(format!("{}:{}", trx_num.block_num, trx_num.trx_idx))
            })?;
        MetaTrx::from_bytes(&bytes)
    }

    /// Returns the spender of `output_ref`, or `None` if it is unspent.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn spent_by(&self, output_ref: &OutputRef) -> Result<Option<SpentBy>> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_SPENT)?, output_ref.to_bytes())
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        bytes.map(|b| SpentBy::from_bytes(&b)).transpose()
    }

    /// Every unspent (and spent) output reference ever paid to `address`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn outputs_for_address(&self, address: &[u8; 20]) -> Result<Vec<OutputRef>> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_ADDRESSES)?, address)
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        match bytes {
            Some(b) => unpack_output_refs(&b),
            None => Ok(Vec::new()),
        }
    }

    /// The block number stored under a block id.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn block_num_for_id(&self, block_id: &SmallHash) -> Result<Option<u64>> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_BLOCK_IDS)?, block_id.as_bytes())
            .map_err(|e| ChainError::Storage(e.to_string()))?;
        Ok(bytes.map(|b| u64::from_be_bytes(b.try_into().unwrap())))
    }

    /// Raw bytes for the stored full block at `block_num`, if any.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn raw_block(&self, block_num: u64) -> Result<Option<Vec<u8>>> {
        self.db
            .get_cf(self.cf(CF_BLOCKS)?, block_num.to_be_bytes())
            .map_err(|e| ChainError::Storage(e.to_string()))
    }

    /// Begins a batched mutation. Nothing is durable until
    /// [`StoreBatch::commit`] is called.
    #[must_use]
    pub fn batch(&self) -> StoreBatch<'_> {
        StoreBatch {
            store: self,
            batch: WriteBatch::default(),
        }
    }
}

/// Where a spent output's source transaction is resolved from: the durable
/// store, plus (when validating a block in progress) every transaction
/// already accepted earlier in that same block. A block's matcher-produced
/// trades spend the resting orders a user transaction in the same block just
/// created, so those sources must be visible before the block's batch ever
/// commits.
pub struct TrxSource<'a> {
    store: &'a UtxoStore,
    in_block: Option<&'a std::collections::HashMap<SmallHash, MetaTrx>>,
}

impl<'a> TrxSource<'a> {
    #[must_use]
    pub const fn new(store: &'a UtxoStore) -> Self {
        Self {
            store,
            in_block: None,
        }
    }

    #[must_use]
    pub const fn with_scratch(
        store: &'a UtxoStore,
        in_block: &'a std::collections::HashMap<SmallHash, MetaTrx>,
    ) -> Self {
        Self {
            store,
            in_block: Some(in_block),
        }
    }

    /// Looks up a transaction by id, preferring the in-block scratch so a
    /// same-block spend sees its source before it is ever committed.
    ///
    /// # Errors
    /// Returns an error on storage failure or if the id is unknown to both
    /// the scratch and the durable store.
    pub fn fetch_trx_by_id(&self, trx_id: &SmallHash) -> Result<MetaTrx> {
        if let Some(meta) = self.in_block.and_then(|scratch| scratch.get(trx_id)) {
            return Ok(meta.clone());
        }
        self.store.fetch_trx_by_id(trx_id)
    }

    /// Returns the spender of `output_ref`, or `None` if it is unspent.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn spent_by(&self, output_ref: &OutputRef) -> Result<Option<SpentBy>> {
        self.store.spent_by(output_ref)
    }
}

/// A pending set of index mutations, applied atomically on commit.
pub struct StoreBatch<'a> {
    store: &'a UtxoStore,
    batch: WriteBatch,
}

impl<'a> StoreBatch<'a> {
    /// Records `block_id` → `block_num` and `block_num` → raw block bytes.
    ///
    /// # Errors
    /// Returns an error if a column family is missing.
    pub fn put_block(&mut self, block_num: u64, block_id: &SmallHash, raw_block: &[u8]) -> Result<()> {
        self.batch
            .put_cf(self.store.cf(CF_BLOCKS)?, block_num.to_be_bytes(), raw_block);
        self.batch.put_cf(
            self.store.cf(CF_BLOCK_IDS)?,
            block_id.as_bytes(),
            block_num.to_be_bytes(),
        );
        Ok(())
    }

    /// Removes the block indices for `block_num`/`block_id` (used by
    /// `pop_block`).
    ///
    /// # Errors
    /// Returns an error if a column family is missing.
    pub fn remove_block(&mut self, block_num: u64, block_id: &SmallHash) -> Result<()> {
        self.batch
            .delete_cf(self.store.cf(CF_BLOCKS)?, block_num.to_be_bytes());
        self.batch
            .delete_cf(self.store.cf(CF_BLOCK_IDS)?, block_id.as_bytes());
        Ok(())
    }

    /// Stores a transaction at `trx_num`, indexes it by id, and indexes every
    /// output's claim addresses.
    ///
    /// # Errors
    /// Returns an error if a column family is missing or serialisation fails.
    pub fn store_trx(&mut self, trx: &Transaction, trx_num: TrxNum) -> Result<()> {
        let trx_id = trx.id();
        let meta = MetaTrx {
            trx: trx.clone(),
            trx_num,
        };
        let meta_bytes = meta.to_bytes();
        self.batch
            .put_cf(self.store.cf(CF_TRXS)?, trx_num.to_key(), meta_bytes);
        self.batch
            .put_cf(self.store.cf(CF_TRX_IDS)?, trx_id.as_bytes(), trx_num.to_key());

        for (idx, output) in trx.outputs.iter().enumerate() {
            for address in output.claim.required_addresses() {
                let output_ref = OutputRef::new(trx_id, idx as u32);
                let mut refs = self.store.outputs_for_address(&address)?;
                refs.push(output_ref);
                self.batch
                    .put_cf(self.store.cf(CF_ADDRESSES)?, address, pack_output_refs(&refs));
            }
        }
        Ok(())
    }

    /// Removes a stored transaction and its address index entries (used by
    /// `pop_block`).
    ///
    /// # Errors
    /// Returns an error if a column family is missing or serialisation fails.
    pub fn remove_trx(&mut self, trx: &Transaction, trx_num: TrxNum) -> Result<()> {
        let trx_id = trx.id();
        self.batch.delete_cf(self.store.cf(CF_TRXS)?, trx_num.to_key());
        self.batch
            .delete_cf(self.store.cf(CF_TRX_IDS)?, trx_id.as_bytes());

        for (idx, output) in trx.outputs.iter().enumerate() {
            for address in output.claim.required_addresses() {
                let output_ref = OutputRef::new(trx_id, idx as u32);
                let mut refs = self.store.outputs_for_address(&address)?;
                refs.retain(|r| *r != output_ref);
                self.batch
                    .put_cf(self.store.cf(CF_ADDRESSES)?, address, pack_output_refs(&refs));
            }
        }
        Ok(())
    }

    /// Marks `output_ref` as spent by `spent_by`.
    ///
    /// # Errors
    /// Returns an error if a column family is missing or serialisation fails.
    pub fn mark_spent(&mut self, output_ref: &OutputRef, spent_by: SpentBy) -> Result<()> {
        self.batch
            .put_cf(self.store.cf(CF_SPENT)?, output_ref.to_bytes(), spent_by.to_bytes());
        Ok(())
    }

    /// Clears the spent marker on `output_ref` (used by `pop_block`).
    ///
    /// # Errors
    /// Returns an error if a column family is missing.
    pub fn unmark_spent(&mut self, output_ref: &OutputRef) -> Result<()> {
        self.batch
            .delete_cf(self.store.cf(CF_SPENT)?, output_ref.to_bytes());
        Ok(())
    }

    /// Atomically applies every queued mutation.
    ///
    /// # Errors
    /// Returns an error if the underlying write fails; on error, no
    /// mutation in the batch has taken effect.
    pub fn commit(self) -> Result<()> {
        self.store
            .db
            .write(self.batch)
            .map_err(|e| ChainError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::claim::ClaimData;
    use crate::transaction::{TxInput, TxOutput};
    use tempfile::tempdir;

    fn sample_trx(address: [u8; 20]) -> Transaction {
        Transaction::new(
            1,
            0,
            0,
            0,
            vec![],
            vec![TxOutput {
                amount: Asset::new(10, AssetType::BTS),
                claim: ClaimData::BySignature { address },
            }],
        )
    }

    #[test]
    fn store_and_fetch_trx_round_trips() {
        let dir = tempdir().unwrap();
        let store = UtxoStore::open(dir.path()).unwrap();
        let trx = sample_trx([1u8; 20]);
        let trx_num = TrxNum::new(1, 0);

        let mut batch = store.batch();
        batch.store_trx(&trx, trx_num).unwrap();
        batch.commit().unwrap();

        let fetched = store.fetch_trx(trx_num).unwrap();
        assert_eq!(fetched.trx, trx);

        let by_id = store.fetch_trx_by_id(&trx.id()).unwrap();
        assert_eq!(by_id.trx, trx);
    }

    #[test]
    fn address_index_tracks_outputs() {
        let dir = tempdir().unwrap();
        let store = UtxoStore::open(dir.path()).unwrap();
        let address = [7u8; 20];
        let trx = sample_trx(address);
        let trx_num = TrxNum::new(1, 0);

        let mut batch = store.batch();
        batch.store_trx(&trx, trx_num).unwrap();
        batch.commit().unwrap();

        let refs = store.outputs_for_address(&address).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].trx_id, trx.id());
    }

    #[test]
    fn spent_marker_round_trips_and_clears() {
        let dir = tempdir().unwrap();
        let store = UtxoStore::open(dir.path()).unwrap();
        let output_ref = OutputRef::new(SmallHash::digest(b"x"), 0);
        let spender = SpentBy {
            trx_num: TrxNum::new(2, 0),
            input_idx: 0,
        };

        let mut batch = store.batch();
        batch.mark_spent(&output_ref, spender).unwrap();
        batch.commit().unwrap();
        assert!(store.spent_by(&output_ref).unwrap().is_some());

        let mut batch = store.batch();
        batch.unmark_spent(&output_ref).unwrap();
        batch.commit().unwrap();
        assert!(store.spent_by(&output_ref).unwrap().is_none());
    }
}
