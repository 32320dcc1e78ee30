//! Signed transactions: inputs, outputs, and the digest/id/signing pipeline.

use chain_primitives::{sign_digest, KeyPair, PrivateKey, Signature, SmallHash};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::HashSet;

use crate::asset::Asset;
use crate::claim::{Address, ClaimData};
use crate::error::ChainError;
use crate::wire::{Pack, Reader, Writer};
use crate::Result;

/// Points at a single output of a prior transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub trx_id: SmallHash,
    pub index: u32,
}

impl OutputRef {
    #[must_use]
    pub const fn new(trx_id: SmallHash, index: u32) -> Self {
        Self { trx_id, index }
    }
}

impl Pack for OutputRef {
    fn pack(&self, w: &mut Writer) {
        w.fixed_bytes(self.trx_id.as_bytes());
        w.u32(self.index);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let trx_id = SmallHash::from_bytes(r.fixed_bytes()?);
        let index = r.u32()?;
        Ok(Self { trx_id, index })
    }
}

/// A transaction input: a reference to a prior output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub output_ref: OutputRef,
}

impl Pack for TxInput {
    fn pack(&self, w: &mut Writer) {
        self.output_ref.pack(w);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            output_ref: OutputRef::unpack(r)?,
        })
    }
}

/// A transaction output: an amount locked under a claim rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: Asset,
    pub claim: ClaimData,
}

impl Pack for TxOutput {
    fn pack(&self, w: &mut Writer) {
        self.amount.pack(w);
        self.claim.pack(w);
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let amount = Asset::unpack(r)?;
        let claim = ClaimData::unpack(r)?;
        Ok(Self { amount, claim })
    }
}

/// A fully-formed, signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    /// Low bits of a recent chain head id, binding this transaction to a
    /// specific chain state.
    pub stake: u32,
    pub valid_after: u64,
    pub valid_blocks: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub signatures: Vec<Signature>,
}

impl Transaction {
    #[must_use]
    pub const fn new(
        version: u32,
        stake: u32,
        valid_after: u64,
        valid_blocks: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
    ) -> Self {
        Self {
            version,
            stake,
            valid_after,
            valid_blocks,
            inputs,
            outputs,
            signatures: Vec::new(),
        }
    }

    fn pack_unsigned(&self, w: &mut Writer) {
        w.u32(self.version);
        w.u32(self.stake);
        w.u64(self.valid_after);
        w.u32(self.valid_blocks);
        w.u32(self.inputs.len() as u32);
        for i in &self.inputs {
            i.pack(w);
        }
        w.u32(self.outputs.len() as u32);
        for o in &self.outputs {
            o.pack(w);
        }
    }

    /// The 32-byte digest that signatures commit to: every field except the
    /// signature set itself.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut w = Writer::new();
        self.pack_unsigned(&mut w);
        Sha256::digest(w.into_vec()).into()
    }

    /// The transaction id: the small hash of the fully-serialised
    /// transaction, signatures included.
    #[must_use]
    pub fn id(&self) -> SmallHash {
        SmallHash::digest(&self.to_bytes())
    }

    /// Signs the transaction's digest with `key`, appending the resulting
    /// signature to the signature set.
    ///
    /// # Errors
    /// Propagates any underlying signing failure.
    pub fn sign_with(&mut self, key: &PrivateKey) -> Result<()> {
        let digest = self.digest();
        let signature = sign_digest(&digest, key)?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Signs the transaction's digest with a keypair, appending the
    /// resulting signature.
    ///
    /// # Errors
    /// Propagates any underlying signing failure.
    pub fn sign_with_keypair(&mut self, keypair: &KeyPair) -> Result<()> {
        self.sign_with(&keypair.private_key)
    }

    /// Recovers the set of addresses that validly signed this transaction's
    /// digest.
    #[must_use]
    pub fn signed_addresses(&self) -> HashSet<Address> {
        let digest = self.digest();
        self.signatures
            .iter()
            .filter_map(|sig| chain_primitives::recover_address(&digest, sig).ok())
            .collect()
    }

    /// Approximate on-wire size in bytes, used for fee-rate calculations.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.to_bytes().len()
    }
}

impl Pack for Transaction {
    fn pack(&self, w: &mut Writer) {
        self.pack_unsigned(w);
        w.u32(self.signatures.len() as u32);
        for sig in &self.signatures {
            w.fixed_bytes(sig.as_bytes());
        }
    }

    fn unpack(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.u32()?;
        let stake = r.u32()?;
        let valid_after = r.u64()?;
        let valid_blocks = r.u32()?;
        let input_count = r.u32()? as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::unpack(r)?);
        }
        let output_count = r.u32()? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::unpack(r)?);
        }
        let sig_count = r.u32()? as usize;
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            let bytes: [u8; chain_primitives::crypto::SIGNATURE_LEN] = r.fixed_bytes()?;
            signatures.push(Signature::from_bytes(&bytes).map_err(ChainError::Primitive)?);
        }
        Ok(Self {
            version,
            stake,
            valid_after,
            valid_blocks,
            inputs,
            outputs,
            signatures,
        })
    }
}

/// Aggregate result of evaluating a signed transaction against chain state.
///
/// Preserves all four fields on the wire (see design notes): the original
/// network this was distilled from only reflects `fees` and
/// `coindays_destroyed` for peer gossip, but there is no compatible peer
/// network here to match, so the full aggregate is kept both in memory and
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrxEval {
    pub fees: u64,
    pub coindays_destroyed: u64,
    pub invalid_coindays_destroyed: u64,
    pub total_spent: u64,
}

impl TrxEval {
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            fees: self.fees.saturating_add(other.fees),
            coindays_destroyed: self
                .coindays_destroyed
                .saturating_add(other.coindays_destroyed),
            invalid_coindays_destroyed: self
                .invalid_coindays_destroyed
                .saturating_add(other.invalid_coindays_destroyed),
            total_spent: self.total_spent.saturating_add(other.total_spent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;
    use chain_primitives::KeyPair;

    fn sample_output(address: Address, amount: u64) -> TxOutput {
        TxOutput {
            amount: Asset::new(amount, AssetType::BTS),
            claim: ClaimData::BySignature { address },
        }
    }

    #[test]
    fn transaction_round_trips_through_wire_format() {
        let keypair = KeyPair::generate();
        let address = keypair.public_key.address_hash();
        let input = TxInput {
            output_ref: OutputRef::new(SmallHash::digest(b"prev"), 0),
        };
        let mut trx = Transaction::new(1, 42, 0, 100, vec![input], vec![sample_output(address, 100)]);
        trx.sign_with_keypair(&keypair).unwrap();

        let bytes = trx.to_bytes();
        let parsed = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, trx);
    }

    #[test]
    fn signing_recovers_the_signer_address() {
        let keypair = KeyPair::generate();
        let address = keypair.public_key.address_hash();
        let mut trx = Transaction::new(1, 0, 0, 0, vec![], vec![sample_output(address, 10)]);
        trx.sign_with_keypair(&keypair).unwrap();

        assert!(trx.signed_addresses().contains(&address));
    }

    #[test]
    fn id_changes_when_signatures_are_added() {
        let keypair = KeyPair::generate();
        let address = keypair.public_key.address_hash();
        let mut trx = Transaction::new(1, 0, 0, 0, vec![], vec![sample_output(address, 10)]);
        let id_before = trx.id();
        trx.sign_with_keypair(&keypair).unwrap();
        assert_ne!(id_before, trx.id());
    }

    #[test]
    fn digest_is_stable_regardless_of_signatures() {
        let keypair = KeyPair::generate();
        let address = keypair.public_key.address_hash();
        let mut trx = Transaction::new(1, 0, 0, 0, vec![], vec![sample_output(address, 10)]);
        let digest_before = trx.digest();
        trx.sign_with_keypair(&keypair).unwrap();
        assert_eq!(digest_before, trx.digest());
    }
}
