use chain_primitives::BlockchainError;
use thiserror::Error;

/// Errors produced by transaction validation, consensus, storage, and
/// configuration concerns across the chain crate.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("double spend: {0:?} already spent")]
    DoubleSpend(String),

    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("transaction not yet valid or expired: {0}")]
    StaleTransaction(String),

    #[error("balance mismatch for asset {0}")]
    BalanceMismatch(String),

    #[error("fee below minimum: required {required}, got {actual}")]
    FeeTooLow { required: u64, actual: u64 },

    #[error("unknown claim tag {0}")]
    UnknownClaimTag(u8),

    #[error("asset type mismatch in market order")]
    AssetTypeMismatch,

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("utxo not found: {0}")]
    UtxoNotFound(String),

    #[error("bad merkle root")]
    BadMerkleRoot,

    #[error("invalid proof of work")]
    InvalidProofOfWork,

    #[error("non-sequential block number: expected {expected}, got {actual}")]
    NonSequentialBlock { expected: u64, actual: u64 },

    #[error("matcher output did not match block contents")]
    MatcherMismatch,

    #[error("block header field {field} did not match the value derived from its transactions: expected {expected}, got {actual}")]
    HeaderAccountingMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Primitive(#[from] BlockchainError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
