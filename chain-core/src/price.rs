//! 64.64 fixed-point prices.
//!
//! A `Price` is a ratio of `quote` units per `base` unit, represented as a
//! 128-bit unsigned value with 64 integer bits and 64 fractional bits. Two
//! prices are only comparable when their `(base, quote)` pair matches.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::asset::AssetType;
use crate::error::ChainError;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

const FRACTIONAL_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// 64.64 fixed-point ratio: `quote_amount / base_amount` scaled by `2^64`.
    pub ratio: u128,
    pub base: AssetType,
    pub quote: AssetType,
}

impl Price {
    /// Builds a price from a quote/base amount pair, e.g. "50 USD per 25 BTS"
    /// is `Price::from_ratio(50, 25, usd, bts)`.
    ///
    /// # Errors
    /// Returns an error if `base_amount` is zero.
    pub fn from_ratio(
        quote_amount: u64,
        base_amount: u64,
        quote: AssetType,
        base: AssetType,
    ) -> Result<Self> {
        if base_amount == 0 {
            return Err(ChainError::AssetTypeMismatch);
        }
        let ratio = (u128::from(quote_amount) << FRACTIONAL_BITS) / u128::from(base_amount);
        Ok(Self { ratio, base, quote })
    }

    #[must_use]
    pub const fn same_market(&self, other: &Self) -> bool {
        self.base.0 == other.base.0 && self.quote.0 == other.quote.0
    }

    /// Compares two prices, requiring they quote the same asset pair.
    ///
    /// # Errors
    /// Returns an error if the asset pairs differ.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering> {
        if !self.same_market(other) {
            return Err(ChainError::AssetTypeMismatch);
        }
        Ok(self.ratio.cmp(&other.ratio))
    }

    /// Converts a `base`-denominated amount into the equivalent
    /// `quote`-denominated amount at this price, rounding down.
    #[must_use]
    pub fn convert_base_to_quote(&self, base_amount: u64) -> u64 {
        let scaled = u128::from(base_amount) * self.ratio;
        (scaled >> FRACTIONAL_BITS) as u64
    }

    /// Converts a `quote`-denominated amount into the equivalent
    /// `base`-denominated amount at this price, rounding down.
    #[must_use]
    pub fn convert_quote_to_base(&self, quote_amount: u64) -> u64 {
        if self.ratio == 0 {
            return 0;
        }
        let scaled = u128::from(quote_amount) << FRACTIONAL_BITS;
        (scaled / self.ratio) as u64
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        (self.ratio as f64) / (1u128 << FRACTIONAL_BITS) as f64
    }
}

impl Pack for Price {
    fn pack(&self, w: &mut Writer) {
        w.u128(self.ratio);
        self.base.pack(w);
        self.quote.pack(w);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let ratio = r.u128()?;
        let base = AssetType::unpack(r)?;
        let quote = AssetType::unpack(r)?;
        Ok(Self { ratio, base, quote })
    }
}
