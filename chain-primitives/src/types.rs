//! Narrow type aliases shared by the primitives and chain crates.

/// Unix timestamp, seconds.
pub type Timestamp = i64;

/// Height (block number) on a chain.
pub type BlockHeight = u64;

/// Index of an output within a transaction.
pub type OutputIndex = u32;

/// Index of an input within a transaction.
pub type InputIndex = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_have_expected_widths() {
        let _t: Timestamp = 0;
        let _h: BlockHeight = 0;
        let _o: OutputIndex = 0;
        let _i: InputIndex = 0;
    }
}
