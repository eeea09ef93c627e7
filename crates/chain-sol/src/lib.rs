//! Solana wire support for the custody service.
//!
//! Address handling, associated token account derivation, SPL token
//! instructions and the compact transaction wire format, written against
//! `ed25519-dalek` and `bs58` directly rather than `solana-sdk`.
//!
//! Transactions go through two stages: a [`PendingTransaction`] collects one
//! signature per required signer, and only once every slot is filled can it
//! become a [`SignedTransaction`] that is safe to submit.

pub mod address;
pub mod error;
pub mod spl_token;
pub mod transaction;

pub use address::{address_to_bytes, bytes_to_address, validate_address};
pub use error::SolError;
pub use spl_token::{
    build_create_associated_token_account_idempotent, build_spl_transfer,
    derive_associated_token_address, parse_token_account,
    TokenAccountData, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    compile_transaction, decode_compact_u16, decode_transaction, encode_compact_u16,
    serialize_message, CompiledInstruction, DecodedTransaction, PendingTransaction,
    SignedTransaction, SolAccountMeta, SolInstruction, SolTransaction, SYSTEM_PROGRAM_ID,
};
