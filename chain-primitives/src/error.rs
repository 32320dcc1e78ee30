use thiserror::Error;

/// Errors shared across the primitives and chain crates.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid hash")]
    InvalidHash,

    #[error("insufficient difficulty")]
    InsufficientDifficulty,

    #[error("nonce space exhausted")]
    NonceNotFound,

    #[error("utxo not found")]
    UtxoNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("cryptographic error: {0}")]
    CryptographicError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for BlockchainError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}
