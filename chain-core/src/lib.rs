//! A UTXO blockchain with an embedded on-chain continuous double-auction
//! market for BitAssets, and an independent proof-of-work name-registration
//! chain with multi-threaded mining.

pub mod asset;
pub mod block;
pub mod blockchain;
pub mod claim;
pub mod error;
pub mod genesis;
pub mod market;
pub mod matching;
pub mod name_chain;
pub mod price;
pub mod transaction;
pub mod utxo;
pub mod validation;
pub mod wire;

pub use asset::{Asset, AssetType};
pub use block::{merkle_root, Block, BlockHeader};
pub use blockchain::{BlockchainDb, NetworkParams};
pub use claim::{Address, ClaimData};
pub use error::{ChainError, Result};
pub use genesis::{genesis_block, genesis_reward_address};
pub use market::{MarginCall, MarketDb, MarketOrder, PricePoint};
pub use matching::{match_orders, sweep_margin_calls};
pub use name_chain::miner::{MinerState, NameMiner, NameMinerDelegate};
pub use name_chain::{genesis_name_block, name_merkle_root, NameBlock, NameHeader, NameTrx};
pub use price::Price;
pub use transaction::{OutputRef, Transaction, TrxEval, TxInput, TxOutput};
pub use utxo::{MetaTrx, SpentBy, StoreBatch, TrxNum, UtxoStore};
pub use validation::evaluate_signed_transaction;
pub use wire::{Pack, Reader, Writer};
