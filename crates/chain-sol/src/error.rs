use thiserror::Error;

/// Solana chain operation errors.
#[derive(Debug, Error)]
pub enum SolError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("missing signatures for: {}", .0.join(", "))]
    MissingSignatures(Vec<String>),

    #[error("serialization error: {0}")]
    SerializationError(String),
}
