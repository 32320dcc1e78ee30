//! Deterministic genesis blocks.
//!
//! The UTXO chain and the name chain are independent proof-of-work chains
//! (see [`crate::name_chain`]) and do not share a genesis: each gets its own
//! fixed-timestamp, no-parent starting block, generated fresh every time
//! rather than checked in as a snapshot, so that a change to the wire
//! format or hash scheme is immediately visible in the genesis id instead
//! of silently drifting from what the code would actually produce.

use chain_primitives::{hash160, SmallHash};

use crate::asset::Asset;
use crate::block::{merkle_root, Block, BlockHeader};
use crate::claim::ClaimData;
use crate::transaction::{Transaction, TxOutput};

/// Fixed timestamp for both chains' genesis blocks: 2009-01-03 18:15:05
/// UTC, the timestamp of Bitcoin's own genesis block.
const GENESIS_TIMESTAMP: i64 = 1_231_006_505;

/// The address the UTXO chain's genesis coinbase pays to. Derived from a
/// fixed phrase rather than a real keypair: nobody holds the private key,
/// so the genesis reward is permanently unspendable, matching how the
/// reference chain treats its own genesis coinbase.
#[must_use]
pub fn genesis_reward_address() -> [u8; 20] {
    hash160(b"the genesis block reward is unspendable")
}

/// Builds the UTXO chain's genesis block: a single coinbase transaction to
/// [`genesis_reward_address`], at block number zero with no parent.
#[must_use]
pub fn genesis_block() -> Block {
    let coinbase = Transaction::new(
        1,
        0,
        0,
        0,
        vec![],
        vec![TxOutput {
            amount: Asset::bts(1_000_000),
            claim: ClaimData::BySignature {
                address: genesis_reward_address(),
            },
        }],
    );
    let header = BlockHeader {
        prev: SmallHash::zero(),
        block_num: 0,
        timestamp: GENESIS_TIMESTAMP,
        trx_merkle_root: merkle_root(&[coinbase.clone()]),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(genesis_block(), genesis_block());
    }

    #[test]
    fn genesis_merkle_root_is_valid() {
        genesis_block().validate_merkle_root().unwrap();
    }

    #[test]
    fn utxo_and_name_genesis_blocks_are_unrelated() {
        let utxo_genesis = genesis_block();
        let name_genesis = crate::name_chain::genesis_name_block();
        assert_eq!(utxo_genesis.header.timestamp, name_genesis.header.timestamp);
        // Same fixed launch timestamp, but otherwise distinct chains: the
        // UTXO chain carries a reward payout, the name chain carries none.
        assert!(!utxo_genesis.transactions.is_empty());
        assert!(name_genesis.trxs.is_empty());
    }
}
