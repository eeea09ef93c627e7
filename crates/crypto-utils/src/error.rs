use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Deliberately carries no detail: a bad padding block and a wrong key
    /// must look the same to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("random source failure: {0}")]
    RandomSource(String),

    #[error("invalid key or iv length")]
    InvalidKeyLength,
}
