//! Pushing a block and then popping it must restore the chain to exactly
//! the state it was in before the block was applied.

use chain_core::{
    genesis_block, merkle_root, Asset, Block, BlockHeader, BlockchainDb, ClaimData, NetworkParams,
    OutputRef, Pack, Transaction, TxInput, TxOutput,
};
use chain_primitives::KeyPair;
use tempfile::tempdir;

fn spend_genesis_coinbase(genesis: &Block, from: &KeyPair, to_addr: [u8; 20]) -> Transaction {
    let coinbase = &genesis.transactions[0];
    let mut spend = Transaction::new(
        1,
        0,
        0,
        0,
        vec![TxInput {
            output_ref: OutputRef::new(coinbase.id(), 0),
        }],
        vec![
            TxOutput {
                amount: Asset::bts(900_000),
                claim: ClaimData::BySignature { address: to_addr },
            },
            TxOutput {
                amount: Asset::bts(99_000),
                claim: ClaimData::BySignature {
                    address: from.public_key.address_hash(),
                },
            },
        ],
    );
    spend.sign_with_keypair(from).unwrap();
    spend
}

#[test]
fn popping_a_pushed_block_restores_the_prior_head_and_utxo_set() {
    let dir = tempdir().unwrap();
    let genesis = genesis_block();
    let genesis_owner = KeyPair::generate();
    // The checked-in genesis pays a fixed, keyless address; swap in a
    // owned coinbase for this test so the spend below can be signed.
    let mut genesis = genesis;
    genesis.transactions[0].outputs[0].claim = ClaimData::BySignature {
        address: genesis_owner.public_key.address_hash(),
    };
    genesis.header.trx_merkle_root =
        merkle_root(&genesis.transactions);

    let mut chain = BlockchainDb::open(dir.path(), genesis.clone(), NetworkParams::default())
        .expect("genesis opens cleanly");
    assert_eq!(chain.head().header.block_num, 0);

    let bob = KeyPair::generate();
    let spend = spend_genesis_coinbase(&genesis, &genesis_owner, bob.public_key.address_hash());

    let header = BlockHeader {
        prev: chain.head().id(),
        block_num: 1,
        timestamp: genesis.header.timestamp + 60,
        trx_merkle_root: merkle_root(&[spend.clone()]),
        // The genesis coinbase pays out 1,000,000 BTS; this spend returns
        // 999,000 of it, burning a 1,000 BTS fee. It ages zero blocks (spent
        // the block right after it was created), so it destroys no coin-days.
        total_shares: 999_000,
        total_cdd: 0,
        fee_rate: 1,
        noncea: 0,
        nonceb: 0,
    };
    let block = Block {
        header,
        transactions: vec![spend],
    };

    chain.push_block(&block).expect("block applies cleanly");
    assert_eq!(chain.head().header.block_num, 1);
    assert_eq!(chain.head().id(), block.id());

    // The coinbase output is now spent; spending it again must fail.
    let replay = spend_genesis_coinbase(&genesis, &genesis_owner, bob.public_key.address_hash());
    let replay_header = BlockHeader {
        prev: block.id(),
        block_num: 2,
        timestamp: header.timestamp + 60,
        trx_merkle_root: merkle_root(&[replay.clone()]),
        total_shares: 0,
        total_cdd: 0,
        fee_rate: 1,
        noncea: 0,
        nonceb: 0,
    };
    let replay_block = Block {
        header: replay_header,
        transactions: vec![replay],
    };
    assert!(chain.push_block(&replay_block).is_err());

    chain.pop_block().expect("pop restores the prior head");
    assert_eq!(chain.head().header.block_num, 0);
    assert_eq!(chain.head().id(), genesis.id());

    // After popping, the coinbase is unspent again and the original spend
    // can be re-applied byte for byte.
    let bytes = block.to_bytes();
    let replayed = Block::from_bytes(&bytes).unwrap();
    chain
        .push_block(&replayed)
        .expect("the same block re-applies after a pop");
    assert_eq!(chain.head().header.block_num, 1);
}
