use serde::{Deserialize, Serialize};
use thiserror::Error;

use sol_rpc::LedgerError;

/// Key custody failures.
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("PIN must be exactly 4 digits")]
    InvalidPin,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong PIN and corrupted record both end up here.
    #[error("decryption failed: invalid PIN or corrupted data")]
    Decryption,

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Payload-free classification of a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    KeyGeneration,
    Encryption,
    Network,
    SubmissionRejected,
    ConfirmationTimeout,
    AddressFormat,
}

/// Transfer failures, one variant per error class.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: invalid PIN or corrupted key record")]
    Authentication,

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("confirmation of {transaction_id} timed out; the transfer may still complete")]
    ConfirmationTimeout { transaction_id: String },

    #[error("invalid address: {0}")]
    AddressFormat(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Validation(_) => ErrorKind::Validation,
            TransferError::Authentication => ErrorKind::Authentication,
            TransferError::KeyGeneration(_) => ErrorKind::KeyGeneration,
            TransferError::Encryption(_) => ErrorKind::Encryption,
            TransferError::Network(_) => ErrorKind::Network,
            TransferError::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            TransferError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            TransferError::AddressFormat(_) => ErrorKind::AddressFormat,
        }
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Network(msg) => TransferError::Network(msg),
            LedgerError::InvalidResponse(msg) => TransferError::Network(msg),
            LedgerError::AddressFormat(msg) => TransferError::AddressFormat(msg),
            LedgerError::Rejected(msg) => TransferError::SubmissionRejected(msg),
        }
    }
}

impl From<chain_sol::SolError> for TransferError {
    fn from(e: chain_sol::SolError) -> Self {
        match e {
            chain_sol::SolError::InvalidAddress(msg) => TransferError::AddressFormat(msg),
            other => TransferError::Encryption(other.to_string()),
        }
    }
}

/// Key store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wallet name already taken: {0}")]
    DuplicateName(String),

    #[error("address already registered: {0}")]
    DuplicateAddress(String),

    #[error("wallet not found: {0}")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Io(format!("snapshot format: {e}"))
    }
}

/// Configuration failures, raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid sponsor secret: {0}")]
    InvalidSponsorSecret(String),

    #[error("invalid token mint: {0}")]
    InvalidMint(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("invalid exchange rate: {0}")]
    InvalidExchangeRate(String),
}

/// Wallet service failures outside the transfer itself.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The transfer landed but the history entries were not written.
    #[error("transfer {transaction_id} succeeded but history was not recorded: {source}")]
    HistoryNotRecorded {
        transaction_id: String,
        explorer_link: String,
        #[source]
        source: StoreError,
    },
}
