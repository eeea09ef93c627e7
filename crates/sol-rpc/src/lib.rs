//! Ledger access for the custody service.
//!
//! [`LedgerClient`] is the seam the transfer flow talks through; [`RpcClient`]
//! implements it as JSON-RPC 2.0 over HTTPS against a Solana cluster.

pub mod client;
pub mod error;
pub mod rpc;

pub use client::{AccountInfo, BlockRef, LedgerClient};
pub use error::LedgerError;
pub use rpc::{RpcClient, COMMITMENT};
