//! Wallet registration, lookup, balances, transfers and history.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crypto_utils::ZeroizingString;
use sol_rpc::LedgerClient;

use crate::amount::{from_minor_units, NATIVE_DECIMALS};
use crate::config::CustodyConfig;
use crate::error::{ServiceError, StoreError};
use crate::key_custody::{self, validate_pin};
use crate::key_store::KeyStore;
use crate::transfer::{TransferOrchestrator, TransferRequest, TransferResult};
use crate::types::{
    ExchangeRate, HistoryEntry, HistoryKind, NativeBalance, TokenBalance, WalletRecord,
    WalletSummary,
};

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 30;

pub struct WalletService<L: LedgerClient, S: KeyStore> {
    ledger: Arc<L>,
    store: Arc<S>,
    orchestrator: TransferOrchestrator<L>,
}

impl<L: LedgerClient, S: KeyStore> WalletService<L, S> {
    pub fn new(ledger: Arc<L>, store: Arc<S>, config: Arc<CustodyConfig>) -> Self {
        let orchestrator = TransferOrchestrator::new(ledger.clone(), config);
        Self {
            ledger,
            store,
            orchestrator,
        }
    }

    pub fn config(&self) -> &CustodyConfig {
        self.orchestrator.config()
    }

    /// Register a new wallet: generate a keypair and store it under `pin`.
    pub fn create_wallet(&self, name: &str, pin: &SecretString) -> Result<WalletSummary, ServiceError> {
        let name = name.trim();
        let len = name.chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
            return Err(ServiceError::Validation(format!(
                "name must be {NAME_MIN_LEN} to {NAME_MAX_LEN} characters"
            )));
        }
        validate_pin(pin.expose_secret())?;

        if self.store.find_by_name(name)?.is_some() {
            return Err(StoreError::DuplicateName(name.to_string()).into());
        }

        let keypair = key_custody::generate()?;
        let key = key_custody::encrypt(pin.expose_secret(), &keypair)?;
        let address = keypair.address();

        let record = WalletRecord {
            name: name.to_string(),
            address: address.clone(),
            public_key: address,
            key,
            created_at: Utc::now(),
            transactions: Vec::new(),
        };
        let summary = record.summary();
        self.store.insert(record)?;

        info!(name = %summary.name, address = %summary.address, "wallet created");
        Ok(summary)
    }

    pub fn get_wallet(&self, name: &str) -> Result<WalletSummary, ServiceError> {
        self.lookup(name).map(|record| record.summary())
    }

    pub fn search(&self, fragment: &str) -> Result<Vec<WalletSummary>, ServiceError> {
        if fragment.trim().is_empty() {
            return Err(ServiceError::Validation("search term is required".into()));
        }
        Ok(self.store.search(fragment)?)
    }

    /// Decrypt and return the wallet's 64-byte secret key as hex.
    pub fn export_private_key(
        &self,
        name: &str,
        pin: &SecretString,
    ) -> Result<ZeroizingString, ServiceError> {
        let record = self.lookup(name)?;
        let keypair = key_custody::decrypt(pin.expose_secret(), &record.key)?;

        info!(name = %record.name, "private key exported");
        Ok(ZeroizingString::new(hex::encode(&*keypair.to_bytes())))
    }

    pub async fn native_balance(&self, name: &str) -> Result<NativeBalance, ServiceError> {
        let record = self.lookup(name)?;
        let lamports = self.ledger.get_balance(&record.address).await?;

        Ok(NativeBalance {
            address: record.address,
            lamports,
            sol: from_minor_units(lamports, NATIVE_DECIMALS),
        })
    }

    pub async fn token_balance(&self, name: &str) -> Result<TokenBalance, ServiceError> {
        let record = self.lookup(name)?;
        let config = self.orchestrator.config();
        let resolver = self.orchestrator.resolver();

        let (account, units) = resolver.resolve_with_balance(&record.address).await?;

        Ok(TokenBalance {
            address: record.address,
            token_account: account.derived_account_address,
            symbol: config.symbol.clone(),
            amount: from_minor_units(units, config.decimals),
        })
    }

    /// Transfer `amount` of the configured token between two registered
    /// wallets and record it on both.
    ///
    /// Transfer failures come back as an unsuccessful [`TransferResult`];
    /// `Err` is reserved for lookup problems and for a confirmed transfer
    /// whose history could not be written.
    pub async fn send_token(
        &self,
        sender_name: &str,
        pin: SecretString,
        recipient_name: &str,
        amount: Decimal,
    ) -> Result<TransferResult, ServiceError> {
        validate_pin(pin.expose_secret())?;
        let sender = self.lookup(sender_name)?;
        let recipient = self.lookup(recipient_name)?;

        let result = self
            .orchestrator
            .transfer(TransferRequest {
                sender_address: sender.address.clone(),
                sender_record: sender.key.clone(),
                pin,
                recipient_address: recipient.address.clone(),
                amount,
            })
            .await;

        if let (true, Some(transaction_id)) = (result.success, result.transaction_id.as_deref()) {
            let currency = self.orchestrator.config().symbol.clone();
            if let Err(source) =
                self.record_transfer(&sender, &recipient, amount, &currency, transaction_id)
            {
                warn!(%transaction_id, error = %source, "transfer history not recorded");
                return Err(ServiceError::HistoryNotRecorded {
                    transaction_id: transaction_id.to_string(),
                    explorer_link: result.explorer_link.clone().unwrap_or_default(),
                    source,
                });
            }
        }

        Ok(result)
    }

    /// The configured token-to-fiat display rate. No network access.
    pub fn exchange_rate(&self) -> ExchangeRate {
        let config = self.orchestrator.config();
        ExchangeRate {
            base: config.symbol.clone(),
            quote: config.fiat_currency.clone(),
            rate: config.fiat_rate,
        }
    }

    pub fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, ServiceError> {
        Ok(self.store.history(name)?)
    }

    fn lookup(&self, name: &str) -> Result<WalletRecord, ServiceError> {
        self.store
            .find_by_name(name)?
            .ok_or_else(|| StoreError::NotFound(name.trim().to_string()).into())
    }

    fn record_transfer(
        &self,
        sender: &WalletRecord,
        recipient: &WalletRecord,
        amount: Decimal,
        currency: &str,
        transaction_id: &str,
    ) -> Result<(), StoreError> {
        let date = Utc::now();
        let entry = |kind, counterparty: &str| HistoryEntry {
            date,
            kind,
            amount,
            currency: currency.to_string(),
            counterparty: counterparty.to_string(),
            status: "completed".to_string(),
            tx_hash: transaction_id.to_string(),
        };

        self.store
            .append_history(&sender.name, entry(HistoryKind::Send, &recipient.name))?;
        self.store
            .append_history(&recipient.name, entry(HistoryKind::Receive, &sender.name))
    }
}
