use async_trait::async_trait;

use crate::error::LedgerError;

/// On-chain account state, as far as the custody flow cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub lamports: u64,
    pub owner: [u8; 32],
    pub data: Vec<u8>,
    pub executable: bool,
}

/// A recent block reference a transaction is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub blockhash: [u8; 32],
    /// Last block height at which a transaction using `blockhash` is accepted.
    pub last_valid_block_height: u64,
}

/// Contract over an external ledger endpoint.
///
/// Every call is a single round trip; nothing here retries.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native balance in lamports.
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError>;

    /// `None` means the account does not exist yet.
    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>, LedgerError>;

    async fn get_latest_block_reference(&self) -> Result<BlockRef, LedgerError>;

    /// Submit signed wire bytes, returning the transaction id.
    async fn submit_transaction(&self, wire: &[u8]) -> Result<String, LedgerError>;

    /// One status poll.
    ///
    /// `Ok(true)` once the transaction is confirmed, `Ok(false)` while it is
    /// unknown or still processing, `Err(Rejected)` if it landed with an error.
    async fn confirm_transaction(&self, transaction_id: &str) -> Result<bool, LedgerError>;
}
