//! Claim data: the closed set of rules under which a transaction output can
//! be spent.
//!
//! The original representation tags an output with an opaque discriminant
//! plus a byte buffer that only the matching claim-evaluation code knows how
//! to decode. Here the same nine claim kinds are a closed Rust sum type;
//! each variant carries its own typed payload, and the wire format remains
//! `discriminant byte + payload`, so the bytes produced are identical in
//! shape to the tagged-union original.

use chain_primitives::SmallHash;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::error::ChainError;
use crate::price::Price;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

/// An address: the hash160 of a recovered public key.
pub type Address = [u8; 20];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimData {
    /// Spendable by whoever signs with the key behind `address`.
    BySignature { address: Address },
    /// Spendable by whoever signs with the key behind a legacy ProtoShares
    /// address; `compressed` selects which of the two PTS address encodings
    /// the claim was paid to.
    ByPts { address: Address, compressed: bool },
    /// A resting bid: pay `price` (quote per base) for up to the output's
    /// own amount of the base asset, proceeds routed to `pay_address`.
    ByBid { pay_address: Address, price: Price },
    /// A short-sell offer: collateralises the output's BTS amount to create
    /// a BitAsset position at `price`, proceeds (the new BitAsset) routed to
    /// `pay_address`.
    ByLong { pay_address: Address, price: Price },
    /// An outstanding short position: `owner` may reclaim `collateral` by
    /// paying back `payoff`; market-triggered at `call_price`.
    ByCover {
        owner: Address,
        payoff: Asset,
        collateral: Asset,
        call_price: Price,
    },
    /// An option contract exercisable by `address` before `expiration` at
    /// `strike`.
    ByOptExecute {
        address: Address,
        strike: Price,
        expiration: i64,
    },
    /// Spendable by any `required`-of-`addresses.len()` signer subset.
    ByMultiSig {
        addresses: Vec<Address>,
        required: u8,
    },
    /// Spendable by `receiver` directly, or by `sender` after `timeout`, or
    /// by `escrow_agent` at any time (dispute resolution).
    ByEscrow {
        sender: Address,
        receiver: Address,
        escrow_agent: Address,
        timeout: i64,
    },
    /// Spendable by whoever supplies preimage `x` with `small_hash(x) == hash`,
    /// alongside the matching `address` signature.
    ByPassword { address: Address, hash: SmallHash },
}

impl ClaimData {
    #[must_use]
    pub const fn discriminant(&self) -> u8 {
        match self {
            Self::BySignature { .. } => 0,
            Self::ByPts { .. } => 1,
            Self::ByBid { .. } => 2,
            Self::ByLong { .. } => 3,
            Self::ByCover { .. } => 4,
            Self::ByOptExecute { .. } => 5,
            Self::ByMultiSig { .. } => 6,
            Self::ByEscrow { .. } => 7,
            Self::ByPassword { .. } => 8,
        }
    }

    /// The set of addresses that, if present among a transaction's signed
    /// addresses, satisfy this claim outright (excludes claims that need
    /// additional context such as a matched cover or a password preimage).
    #[must_use]
    pub fn required_addresses(&self) -> Vec<Address> {
        match self {
            Self::BySignature { address } | Self::ByPts { address, .. } => vec![*address],
            Self::ByBid { pay_address, .. } | Self::ByLong { pay_address, .. } => {
                vec![*pay_address]
            }
            Self::ByCover { owner, .. } => vec![*owner],
            Self::ByOptExecute { address, .. } | Self::ByPassword { address, .. } => {
                vec![*address]
            }
            Self::ByMultiSig { addresses, .. } => addresses.clone(),
            Self::ByEscrow {
                sender,
                receiver,
                escrow_agent,
                ..
            } => vec![*sender, *receiver, *escrow_agent],
        }
    }
}

impl Pack for ClaimData {
    fn pack(&self, w: &mut Writer) {
        w.u8(self.discriminant());
        match self {
            Self::BySignature { address } => {
                w.fixed_bytes(address);
            }
            Self::ByPts { address, compressed } => {
                w.fixed_bytes(address);
                w.u8(u8::from(*compressed));
            }
            Self::ByBid { pay_address, price } => {
                w.fixed_bytes(pay_address);
                price.pack(w);
            }
            Self::ByLong { pay_address, price } => {
                w.fixed_bytes(pay_address);
                price.pack(w);
            }
            Self::ByCover {
                owner,
                payoff,
                collateral,
                call_price,
            } => {
                w.fixed_bytes(owner);
                payoff.pack(w);
                collateral.pack(w);
                call_price.pack(w);
            }
            Self::ByOptExecute {
                address,
                strike,
                expiration,
            } => {
                w.fixed_bytes(address);
                strike.pack(w);
                w.i64(*expiration);
            }
            Self::ByMultiSig {
                addresses,
                required,
            } => {
                w.u32(addresses.len() as u32);
                for a in addresses {
                    w.fixed_bytes(a);
                }
                w.u8(*required);
            }
            Self::ByEscrow {
                sender,
                receiver,
                escrow_agent,
                timeout,
            } => {
                w.fixed_bytes(sender);
                w.fixed_bytes(receiver);
                w.fixed_bytes(escrow_agent);
                w.i64(*timeout);
            }
            Self::ByPassword { address, hash } => {
                w.fixed_bytes(address);
                w.fixed_bytes(hash.as_bytes());
            }
        }
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let tag = r.u8()?;
        Ok(match tag {
            0 => Self::BySignature {
                address: r.fixed_bytes()?,
            },
            1 => Self::ByPts {
                address: r.fixed_bytes()?,
                compressed: r.u8()? != 0,
            },
            2 => Self::ByBid {
                pay_address: r.fixed_bytes()?,
                price: Price::unpack(r)?,
            },
            3 => Self::ByLong {
                pay_address: r.fixed_bytes()?,
                price: Price::unpack(r)?,
            },
            4 => Self::ByCover {
                owner: r.fixed_bytes()?,
                payoff: Asset::unpack(r)?,
                collateral: Asset::unpack(r)?,
                call_price: Price::unpack(r)?,
            },
            5 => Self::ByOptExecute {
                address: r.fixed_bytes()?,
                strike: Price::unpack(r)?,
                expiration: r.i64()?,
            },
            6 => {
                let count = r.u32()? as usize;
                let mut addresses = Vec::with_capacity(count);
                for _ in 0..count {
                    addresses.push(r.fixed_bytes()?);
                }
                let required = r.u8()?;
                Self::ByMultiSig {
                    addresses,
                    required,
                }
            }
            7 => Self::ByEscrow {
                sender: r.fixed_bytes()?,
                receiver: r.fixed_bytes()?,
                escrow_agent: r.fixed_bytes()?,
                timeout: r.i64()?,
            },
            8 => Self::ByPassword {
                address: r.fixed_bytes()?,
                hash: SmallHash::from_bytes(r.fixed_bytes()?),
            },
            other => return Err(ChainError::UnknownClaimTag(other)),
        })
    }
}
