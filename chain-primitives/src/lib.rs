pub mod address;
pub mod crypto;
pub mod difficulty;
pub mod error;
pub mod extended_key;
pub mod hash;
pub mod name;
pub mod types;

pub use crypto::{
    hash160, public_key_from_bytes, recover_address, recover_public_key, sign_digest,
    sign_transaction_hash, signature_from_bytes, verify_transaction_signature, KeyPair,
    PrivateKey, PublicKey, Signature,
};
pub use difficulty::{difficulty160, difficulty224};
pub use error::BlockchainError;
pub use extended_key::{ExtendedPrivateKey, ExtendedPublicKey};
pub use hash::{PowSeed, SmallHash, TruncatedHash224};
pub use name::{canonicalize_name, name_hash};

pub type Result<T> = std::result::Result<T, BlockchainError>;
