use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::key_custody::EncryptedKeyRecord;

/// An owner's associated token account for the configured mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccountRef {
    pub owner_address: String,
    pub mint_address: String,
    pub derived_account_address: String,
    pub exists: bool,
}

/// A registered wallet as held by the key store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub name: String,
    pub address: String,
    pub public_key: String,
    #[serde(flatten)]
    pub key: EncryptedKeyRecord,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub transactions: Vec<HistoryEntry>,
}

impl WalletRecord {
    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            name: self.name.clone(),
            address: self.address.clone(),
            public_key: self.public_key.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public view of a wallet, without any key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub name: String,
    pub address: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Send,
    Receive,
}

/// One side of a completed transfer, recorded on each party's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub amount: Decimal,
    pub currency: String,
    pub counterparty: String,
    pub status: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeBalance {
    pub address: String,
    pub lamports: u64,
    pub sol: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub address: String,
    pub token_account: String,
    pub symbol: String,
    pub amount: Decimal,
}

/// Static token-to-fiat display rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
}
