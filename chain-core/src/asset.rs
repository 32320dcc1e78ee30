//! Asset amounts and asset-type identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ChainError;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

/// Identifies an asset type. `0` is the reserved base unit (BTS); every other
/// value names a BitAsset registered on the name chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetType(pub u16);

impl AssetType {
    pub const BTS: AssetType = AssetType(0);

    #[must_use]
    pub const fn is_bts(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bts() {
            write!(f, "BTS")
        } else {
            write!(f, "ASSET#{}", self.0)
        }
    }
}

/// A typed amount: `amount` units of `asset_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: u64,
    pub asset_type: AssetType,
}

impl Asset {
    #[must_use]
    pub const fn new(amount: u64, asset_type: AssetType) -> Self {
        Self { amount, asset_type }
    }

    #[must_use]
    pub const fn bts(amount: u64) -> Self {
        Self::new(amount, AssetType::BTS)
    }

    /// Adds two amounts of the same asset type.
    ///
    /// # Errors
    /// Returns an error if the asset types differ or the sum overflows.
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        if self.asset_type != other.asset_type {
            return Err(ChainError::BalanceMismatch(
                "cannot add amounts of different asset types".into(),
            ));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| ChainError::BalanceMismatch("asset amount overflow".into()))?;
        Ok(Self::new(amount, self.asset_type))
    }

    /// Subtracts `other` from `self`.
    ///
    /// # Errors
    /// Returns an error if the asset types differ or the result underflows.
    pub fn checked_sub(&self, other: &Self) -> Result<Self> {
        if self.asset_type != other.asset_type {
            return Err(ChainError::BalanceMismatch(
                "cannot subtract amounts of different asset types".into(),
            ));
        }
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| ChainError::BalanceMismatch("asset amount underflow".into()))?;
        Ok(Self::new(amount, self.asset_type))
    }
}

impl Pack for AssetType {
    fn pack(&self, w: &mut Writer) {
        w.u16(self.0);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self(r.u16()?))
    }
}

impl Pack for Asset {
    fn pack(&self, w: &mut Writer) {
        w.u64(self.amount);
        self.asset_type.pack(w);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let amount = r.u64()?;
        let asset_type = AssetType::unpack(r)?;
        Ok(Self { amount, asset_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_round_trips_through_wire_format() {
        let asset = Asset::new(12345, AssetType(7));
        let bytes = asset.to_bytes();
        assert_eq!(Asset::from_bytes(&bytes).unwrap(), asset);
    }

    #[test]
    fn add_same_type_succeeds() {
        let a = Asset::bts(10);
        let b = Asset::bts(5);
        assert_eq!(a.checked_add(&b).unwrap(), Asset::bts(15));
    }

    #[test]
    fn add_different_type_fails() {
        let a = Asset::bts(10);
        let b = Asset::new(5, AssetType(1));
        assert!(a.checked_add(&b).is_err());
    }

    #[test]
    fn sub_underflow_fails() {
        let a = Asset::bts(1);
        let b = Asset::bts(2);
        assert!(a.checked_sub(&b).is_err());
    }
}
