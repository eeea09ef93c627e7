//! # custody-core
//!
//! PIN-encrypted key custody and sponsored SPL token transfers.
//!
//! - [`key_custody`]: keypair generation, PBKDF2 + AES-256-CBC records
//! - [`token_account`]: associated token account derivation and lookup
//! - [`transfer`]: the transfer state machine, sponsor pays every fee
//! - [`service`]: wallet registration, balances and history over a [`KeyStore`]

pub mod amount;
pub mod config;
pub mod error;
pub mod key_custody;
pub mod key_store;
pub mod service;
pub mod token_account;
pub mod transfer;
pub mod types;

pub use config::{Cluster, CustodyConfig, SponsorIdentity};
pub use error::{ConfigError, CustodyError, ErrorKind, ServiceError, StoreError, TransferError};
pub use key_custody::{EncryptedKeyRecord, Keypair};
pub use key_store::{KeyStore, MemoryKeyStore};
pub use service::WalletService;
pub use token_account::TokenAccountResolver;
pub use transfer::{TransferOrchestrator, TransferRequest, TransferResult, TransferStage};
pub use types::{
    ExchangeRate, HistoryEntry, HistoryKind, NativeBalance, TokenAccountRef, TokenBalance,
    WalletRecord, WalletSummary,
};
