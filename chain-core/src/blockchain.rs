//! The blockchain database: sequential block application against the UTXO
//! store and the in-memory market, plus fee-rate and difficulty retargeting.
//!
//! # Simplification
//! Transactions within a single block may not spend outputs created earlier
//! in the same block (no same-block UTXO chaining). This keeps classification
//! of a block's transactions into "user" and "matcher-produced" tractable: a
//! transaction's inputs are resolved entirely against the state as of the
//! *previous* block, so the matcher can be replayed deterministically from
//! that same starting point and compared byte-for-byte against the block's
//! trailing transactions.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chain_primitives::SmallHash;

use crate::block::Block;
use crate::claim::ClaimData;
use crate::error::ChainError;
use crate::market::{MarketDb, MarketOrder};
use crate::matching::{match_orders, sweep_margin_calls};
use crate::transaction::{OutputRef, Transaction, TrxEval};
use crate::utxo::{MetaTrx, SpentBy, TrxNum, TrxSource, UtxoStore};
use crate::validation::evaluate_signed_transaction;
use crate::wire::Pack;
use crate::Result;

/// Tunable constants governing block validation, fees, and retargeting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Minimum fee, in BTS, charged per byte of transaction.
    pub fee_rate: u64,
    /// Seconds each block is expected to take.
    pub block_interval_seconds: i64,
    /// How many blocks the difficulty retarget window spans.
    pub difficulty_adjustment_period: u64,
    /// Blocks a coinbase output must age before it is spendable.
    pub coinbase_maturity: u64,
    /// Blocks expected in a year, used for reward and interest schedules.
    pub blocks_per_year: u64,
    /// Floor below which proof-of-work difficulty never retargets.
    pub min_difficulty: u64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            fee_rate: 1,
            block_interval_seconds: 60,
            difficulty_adjustment_period: 2016,
            coinbase_maturity: 100,
            blocks_per_year: 525_600,
            min_difficulty: 1,
        }
    }
}

/// The UTXO store, the live order book, and chain head paired with the
/// parameters governing how new blocks are accepted.
pub struct BlockchainDb {
    store: UtxoStore,
    market: MarketDb,
    head: Block,
    difficulty: u64,
    params: NetworkParams,
    /// One entry per applied block, holding the book/difficulty/fee-rate as
    /// they stood immediately before that block was applied, so `pop_block`
    /// can restore them exactly rather than just rewinding the UTXO store.
    history: Vec<(MarketDb, u64, u64)>,
}

impl BlockchainDb {
    /// Opens (or creates) the UTXO store at `path` and seeds it with
    /// `genesis` if it is empty.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or the genesis block
    /// fails basic validation.
    pub fn open(path: impl AsRef<Path>, genesis: Block, params: NetworkParams) -> Result<Self> {
        let store = UtxoStore::open(path)?;
        genesis.validate_merkle_root()?;

        if store.block_num_for_id(&genesis.id())?.is_none() {
            let mut batch = store.batch();
            for (idx, trx) in genesis.transactions.iter().enumerate() {
                batch.store_trx(trx, TrxNum::new(genesis.header.block_num, idx as u32))?;
            }
            batch.put_block(genesis.header.block_num, &genesis.id(), &genesis.to_bytes())?;
            batch.commit()?;
        }

        Ok(Self {
            store,
            market: MarketDb::new(),
            head: genesis,
            difficulty: params.min_difficulty,
            params,
            history: Vec::new(),
        })
    }

    #[must_use]
    pub const fn head(&self) -> &Block {
        &self.head
    }

    #[must_use]
    pub const fn store(&self) -> &UtxoStore {
        &self.store
    }

    #[must_use]
    pub const fn market(&self) -> &MarketDb {
        &self.market
    }

    #[must_use]
    pub const fn difficulty(&self) -> u64 {
        self.difficulty
    }

    /// Validates and applies `block` on top of the current head.
    ///
    /// # Errors
    /// Returns the first rule `block` breaks: header linkage, proof of work,
    /// the Merkle commitment, a transaction's own validity, or a mismatch
    /// between the block's claimed matcher output and what replaying the
    /// matcher against the pre-block book actually produces.
    pub fn push_block(&mut self, block: &Block) -> Result<()> {
        self.validate_header(block)?;
        block.validate_merkle_root()?;

        let next_num = block.header.block_num;
        let mut working_market = self.clone_market();
        let mut spent_in_block: HashSet<OutputRef> = HashSet::new();
        let mut aggregate = TrxEval::default();

        // A matcher trade spends the resting order a user transaction earlier
        // in this same block just created, so its source must resolve before
        // the block's batch ever commits; this scratch stands in for the
        // not-yet-durable part of the block while it is being validated.
        let mut block_scratch: HashMap<SmallHash, MetaTrx> = HashMap::new();

        let mut split_at = block.transactions.len();
        for (idx, trx) in block.transactions.iter().enumerate() {
            let source = TrxSource::with_scratch(&self.store, &block_scratch);
            let is_market = spends_resting_order(&source, trx)?;
            if is_market && split_at == block.transactions.len() {
                split_at = idx;
            }
            for input in &trx.inputs {
                if !spent_in_block.insert(input.output_ref) {
                    return Err(ChainError::DoubleSpend(format!("{:?}", input.output_ref)));
                }
            }
            let eval = evaluate_signed_transaction(
                trx,
                &source,
                self.head.header.block_num,
                self.head.header.timestamp,
                &self.params,
                is_market,
                is_market,
            )?;
            aggregate = aggregate.merge(&eval);

            if !is_market {
                seed_new_resting_orders(&mut working_market, trx);
            }
            block_scratch.insert(
                trx.id(),
                MetaTrx {
                    trx: trx.clone(),
                    trx_num: TrxNum::new(next_num, idx as u32),
                },
            );
        }

        let mut expected_matcher = match_orders(&mut working_market, next_num);
        for base_unit in working_market.active_pairs().iter().map(|(_, base)| *base) {
            expected_matcher.extend(sweep_margin_calls(&mut working_market, base_unit, next_num));
        }

        let actual_matcher = &block.transactions[split_at..];
        if actual_matcher.len() != expected_matcher.len()
            || actual_matcher
                .iter()
                .zip(expected_matcher.iter())
                .any(|(a, b)| a.to_bytes() != b.to_bytes())
        {
            warn!(block_num = next_num, "matcher replay mismatch");
            return Err(ChainError::MatcherMismatch);
        }

        // The header's own accounting fields are consensus-critical inputs to
        // next block's fee/difficulty retarget, so they must be exactly what
        // this block's transactions produce, not whatever the block claims.
        let expected_total_shares = self.head.header.total_shares.saturating_sub(aggregate.fees);
        if block.header.total_shares != expected_total_shares {
            return Err(ChainError::HeaderAccountingMismatch {
                field: "total_shares",
                expected: expected_total_shares,
                actual: block.header.total_shares,
            });
        }
        if block.header.total_cdd != aggregate.coindays_destroyed {
            return Err(ChainError::HeaderAccountingMismatch {
                field: "total_cdd",
                expected: aggregate.coindays_destroyed,
                actual: block.header.total_cdd,
            });
        }
        let expected_fee_rate =
            retarget_fee_rate(self.params.fee_rate, block.to_bytes().len() as u64, 1);
        if block.header.fee_rate != expected_fee_rate {
            return Err(ChainError::HeaderAccountingMismatch {
                field: "fee_rate",
                expected: expected_fee_rate,
                actual: block.header.fee_rate,
            });
        }

        let mut batch = self.store.batch();
        for (idx, trx) in block.transactions.iter().enumerate() {
            let trx_num = TrxNum::new(next_num, idx as u32);
            for (input_idx, input) in trx.inputs.iter().enumerate() {
                batch.mark_spent(
                    &input.output_ref,
                    SpentBy {
                        trx_num,
                        input_idx: input_idx as u32,
                    },
                )?;
            }
            batch.store_trx(trx, trx_num)?;
        }
        batch.put_block(next_num, &block.id(), &block.to_bytes())?;
        batch.commit()?;

        self.history
            .push((self.market.clone(), self.difficulty, self.params.fee_rate));
        self.market = working_market;
        self.difficulty = self.retarget_difficulty(self.head.header.total_shares, aggregate.coindays_destroyed);
        self.params.fee_rate = expected_fee_rate;
        self.head = block.clone();

        info!(
            block_num = next_num,
            fees = aggregate.fees,
            trxs = block.transactions.len(),
            "applied block"
        );
        Ok(())
    }

    /// Reverts the current head, restoring the previous block as head and
    /// the book/difficulty/fee-rate to exactly what they were before the
    /// reverted block was applied.
    ///
    /// # Errors
    /// Returns an error if the head's parent cannot be located in the store,
    /// or if the store update fails.
    pub fn pop_block(&mut self) -> Result<()> {
        let head = self.head.clone();
        let Some(prev_num) = self.store.block_num_for_id(&head.header.prev)? else {
            return Err(ChainError::UtxoNotFound(head.header.prev.to_string()));
        };
        let raw = self
            .store
            .raw_block(prev_num)?
            .ok_or_else(|| ChainError::UtxoNotFound(head.header.prev.to_string()))?;
        let prev_block = Block::from_bytes(&raw)?;

        let mut batch = self.store.batch();
        for (idx, trx) in head.transactions.iter().enumerate() {
            for input in &trx.inputs {
                batch.unmark_spent(&input.output_ref)?;
            }
            batch.remove_trx(trx, TrxNum::new(head.header.block_num, idx as u32))?;
        }
        batch.remove_block(head.header.block_num, &head.id())?;
        batch.commit()?;

        let (market, difficulty, fee_rate) = self
            .history
            .pop()
            .ok_or_else(|| ChainError::Storage("no prior book/difficulty snapshot to restore".into()))?;
        self.market = market;
        self.difficulty = difficulty;
        self.params.fee_rate = fee_rate;
        self.head = prev_block;
        Ok(())
    }

    fn validate_header(&self, block: &Block) -> Result<()> {
        if block.header.prev != self.head.id() {
            return Err(ChainError::NonSequentialBlock {
                expected: self.head.header.block_num + 1,
                actual: block.header.block_num,
            });
        }
        let expected_num = self.head.header.block_num + 1;
        if block.header.block_num != expected_num {
            return Err(ChainError::NonSequentialBlock {
                expected: expected_num,
                actual: block.header.block_num,
            });
        }
        block.header.validate_work(self.difficulty)?;
        Ok(())
    }

    fn clone_market(&self) -> MarketDb {
        self.market.clone()
    }

    /// `required = prev_difficulty * (prev_total_shares - min(total_cdd, prev_total_shares) + 1)`,
    /// where `prev_total_shares` stands in for `prev_avail_cdays /
    /// BLOCKS_PER_YEAR`: the coin-days every existing share can destroy in a
    /// single block once a year's worth of aging has accrued. As `total_cdd`
    /// (the coin-days this block actually destroyed) approaches that figure,
    /// the factor collapses toward 1 and difficulty holds steady; as it
    /// approaches zero, the factor — and difficulty — blows up.
    fn retarget_difficulty(&self, prev_total_shares: u64, total_cdd: u64) -> u64 {
        let avg_cdd_per_block = u128::from(prev_total_shares);
        let cdd = u128::from(total_cdd).min(avg_cdd_per_block);
        let factor = avg_cdd_per_block.saturating_sub(cdd).saturating_add(1);
        let next = u128::from(self.difficulty).saturating_mul(factor);
        u64::try_from(next)
            .unwrap_or(u64::MAX)
            .max(self.params.min_difficulty)
    }
}

/// Re-targets a block's fee rate from the previous one and the block's own
/// byte size: `fee' = max(min_fee, (99*fee + size*fee/(512*1024)) / 100)`.
#[must_use]
pub fn retarget_fee_rate(previous_fee_rate: u64, block_size_bytes: u64, min_fee: u64) -> u64 {
    let congestion_term = block_size_bytes.saturating_mul(previous_fee_rate) / (512 * 1024);
    let next = (previous_fee_rate.saturating_mul(99) + congestion_term) / 100;
    next.max(min_fee)
}

/// `true` if any input of `trx` spends an output that only the matching
/// engine is permitted to consume.
fn spends_resting_order(source: &TrxSource<'_>, trx: &Transaction) -> Result<bool> {
    for input in &trx.inputs {
        let spent = source.fetch_trx_by_id(&input.output_ref.trx_id)?;
        let Some(output) = spent.trx.outputs.get(input.output_ref.index as usize) else {
            continue;
        };
        if matches!(
            output.claim,
            ClaimData::ByBid { .. } | ClaimData::ByLong { .. } | ClaimData::ByCover { .. }
        ) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn seed_new_resting_orders(market: &mut MarketDb, trx: &Transaction) {
    for (idx, output) in trx.outputs.iter().enumerate() {
        match &output.claim {
            ClaimData::ByBid { pay_address, price } => {
                let order = MarketOrder {
                    output_ref: OutputRef::new(trx.id(), idx as u32),
                    pay_address: *pay_address,
                    price: *price,
                    amount: output.amount,
                };
                if output.amount.asset_type == price.quote {
                    market.insert_bid(order);
                } else {
                    market.insert_ask(order);
                }
            }
            ClaimData::ByLong { pay_address, price } => {
                market.insert_short(MarketOrder {
                    output_ref: OutputRef::new(trx.id(), idx as u32),
                    pay_address: *pay_address,
                    price: *price,
                    amount: output.amount,
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::claim::ClaimData;
    use crate::transaction::TxOutput;
    use chain_primitives::{KeyPair, SmallHash};
    use tempfile::tempdir;

    fn genesis_block(reward_address: [u8; 20]) -> Block {
        let coinbase = Transaction::new(
            1,
            0,
            0,
            0,
            vec![],
            vec![TxOutput {
                amount: Asset::bts(1_000_000),
                claim: ClaimData::BySignature {
                    address: reward_address,
                },
            }],
        );
        let header = crate::block::BlockHeader {
            prev: SmallHash::zero(),
            block_num: 0,
            timestamp: 0,
            trx_merkle_root: crate::block::merkle_root(&[coinbase.clone()]),
            total_shares: 1_000_000,
            total_cdd: 0,
            fee_rate: 1,
            noncea: 0,
            nonceb: 0,
        };
        Block {
            header,
            transactions: vec![coinbase],
        }
    }

    #[test]
    fn opening_seeds_the_genesis_block() {
        let dir = tempdir().unwrap();
        let keypair = KeyPair::generate();
        let genesis = genesis_block(keypair.public_key.address_hash());
        let chain = BlockchainDb::open(dir.path(), genesis.clone(), NetworkParams::default()).unwrap();
        assert_eq!(chain.head().header.block_num, 0);
    }

    #[test]
    fn pushing_a_block_with_wrong_prev_is_rejected() {
        let dir = tempdir().unwrap();
        let keypair = KeyPair::generate();
        let genesis = genesis_block(keypair.public_key.address_hash());
        let mut chain =
            BlockchainDb::open(dir.path(), genesis, NetworkParams::default()).unwrap();

        let mut bad_header = chain.head().header;
        bad_header.block_num = 1;
        bad_header.prev = SmallHash::digest(b"not the real head");
        let bad_block = Block {
            header: bad_header,
            transactions: vec![],
        };
        assert!(chain.push_block(&bad_block).is_err());
    }

    #[test]
    fn fee_rate_retargets_toward_congestion() {
        let idle = retarget_fee_rate(100, 0, 1);
        assert_eq!(idle, 99);
        let busy = retarget_fee_rate(100, 10 * 1024 * 1024, 1);
        assert!(busy > 99);
    }
}
