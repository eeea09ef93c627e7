//! Sponsored token transfers.
//!
//! A transfer walks `Validating -> DecryptingKey -> ResolvingAccounts ->
//! BuildingTransaction -> Signing -> Submitting -> Confirming` and ends in a
//! [`TransferResult`]. The sponsor pays fees and any account creation; the
//! sender only authorizes the token movement. Nothing is retried.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use chain_sol::{
    address_to_bytes, build_create_associated_token_account_idempotent, build_spl_transfer,
    bytes_to_address, compile_transaction, PendingTransaction, SignedTransaction,
};
use sol_rpc::{LedgerClient, LedgerError};

use crate::amount::to_minor_units;
use crate::config::CustodyConfig;
use crate::error::{ErrorKind, TransferError};
use crate::key_custody::{self, EncryptedKeyRecord, Keypair};
use crate::token_account::TokenAccountResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Validating,
    DecryptingKey,
    ResolvingAccounts,
    BuildingTransaction,
    Signing,
    Submitting,
    Confirming,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Validating => "validating",
            TransferStage::DecryptingKey => "decrypting_key",
            TransferStage::ResolvingAccounts => "resolving_accounts",
            TransferStage::BuildingTransaction => "building_transaction",
            TransferStage::Signing => "signing",
            TransferStage::Submitting => "submitting",
            TransferStage::Confirming => "confirming",
        };
        f.write_str(name)
    }
}

/// One transfer, as handed over by the caller.
#[derive(Debug)]
pub struct TransferRequest {
    pub sender_address: String,
    pub sender_record: EncryptedKeyRecord,
    pub pin: SecretString,
    pub recipient_address: String,
    /// Human units; converted to minor units with the configured decimals.
    pub amount: Decimal,
}

/// Terminal outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<TransferStage>,
}

impl TransferResult {
    fn succeeded(transaction_id: String, explorer_link: String) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id),
            explorer_link: Some(explorer_link),
            error_kind: None,
            error_message: None,
            failed_stage: None,
        }
    }

    fn failed(stage: TransferStage, error: &TransferError) -> Self {
        Self {
            success: false,
            transaction_id: None,
            explorer_link: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            failed_stage: Some(stage),
        }
    }
}

type Failure = (TransferStage, TransferError);

fn at<E: Into<TransferError>>(stage: TransferStage) -> impl FnOnce(E) -> Failure {
    move |e| (stage, e.into())
}

/// Runs sponsored transfers of the configured token.
pub struct TransferOrchestrator<L: LedgerClient> {
    ledger: Arc<L>,
    resolver: TokenAccountResolver<L>,
    config: Arc<CustodyConfig>,
}

impl<L: LedgerClient> TransferOrchestrator<L> {
    pub fn new(ledger: Arc<L>, config: Arc<CustodyConfig>) -> Self {
        let resolver = TokenAccountResolver::new(ledger.clone(), config.mint);
        Self {
            ledger,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TokenAccountResolver<L> {
        &self.resolver
    }

    /// Run one transfer to completion. Every error is folded into the result.
    pub async fn transfer(&self, request: TransferRequest) -> TransferResult {
        let sender = request.sender_address.as_str();
        let recipient = request.recipient_address.as_str();

        match self.run(&request).await {
            Ok(transaction_id) => {
                let link = self.config.cluster.explorer_link(&transaction_id);
                info!(%sender, %recipient, %transaction_id, "transfer confirmed");
                TransferResult::succeeded(transaction_id, link)
            }
            Err((stage, error)) => {
                warn!(%sender, %recipient, %stage, kind = ?error.kind(), %error, "transfer failed");
                TransferResult::failed(stage, &error)
            }
        }
    }

    async fn run(&self, request: &TransferRequest) -> Result<String, Failure> {
        debug!(stage = %TransferStage::Validating, "entering stage");
        let (units, sender, recipient) = self.validate(request).map_err(at(TransferStage::Validating))?;

        debug!(stage = %TransferStage::DecryptingKey, "entering stage");
        let keypair = key_custody::decrypt(request.pin.expose_secret(), &request.sender_record)
            .map_err(|_| (TransferStage::DecryptingKey, TransferError::Authentication))?;
        if keypair.public_key() != sender {
            return Err((TransferStage::DecryptingKey, TransferError::Authentication));
        }

        // Consumes the keypair; it is gone before anything is submitted.
        let signed = self.build_and_sign(keypair, sender, recipient, units).await?;

        debug!(stage = %TransferStage::Submitting, "entering stage");
        let transaction_id = self
            .ledger
            .submit_transaction(signed.wire_bytes())
            .await
            .map_err(at(TransferStage::Submitting))?;
        if transaction_id != signed.transaction_id() {
            warn!(
                returned = %transaction_id,
                expected = %signed.transaction_id(),
                "ledger returned an unexpected transaction id"
            );
        }

        debug!(stage = %TransferStage::Confirming, %transaction_id, "entering stage");
        self.await_confirmation(&transaction_id)
            .await
            .map_err(at(TransferStage::Confirming))?;

        Ok(transaction_id)
    }

    fn validate(&self, request: &TransferRequest) -> Result<(u64, [u8; 32], [u8; 32]), TransferError> {
        let units = to_minor_units(request.amount, self.config.decimals)?;

        let sender = address_to_bytes(&request.sender_address)
            .map_err(|e| TransferError::Validation(format!("sender: {e}")))?;
        let recipient = address_to_bytes(&request.recipient_address)
            .map_err(|e| TransferError::Validation(format!("recipient: {e}")))?;

        if sender == recipient {
            return Err(TransferError::Validation(
                "sender and recipient must differ".into(),
            ));
        }

        Ok((units, sender, recipient))
    }

    async fn build_and_sign(
        &self,
        keypair: Keypair,
        sender: [u8; 32],
        recipient: [u8; 32],
        units: u64,
    ) -> Result<SignedTransaction, Failure> {
        let sponsor = self.config.sponsor.public_key();

        debug!(stage = %TransferStage::ResolvingAccounts, "entering stage");
        let sender_account = self
            .resolver
            .derive_account(&sender)
            .map_err(at(TransferStage::ResolvingAccounts))?;
        let recipient_account = self
            .resolver
            .derive_account(&recipient)
            .map_err(at(TransferStage::ResolvingAccounts))?;
        let recipient_exists = self
            .resolver
            .account_exists(&bytes_to_address(&recipient_account))
            .await
            .map_err(at(TransferStage::ResolvingAccounts))?;

        debug!(stage = %TransferStage::BuildingTransaction, recipient_exists, "entering stage");
        let block = self
            .ledger
            .get_latest_block_reference()
            .await
            .map_err(at(TransferStage::BuildingTransaction))?;

        let mut instructions = Vec::with_capacity(2);
        if !recipient_exists {
            instructions.push(
                build_create_associated_token_account_idempotent(
                    &sponsor,
                    &recipient,
                    &self.config.mint,
                )
                .map_err(at(TransferStage::BuildingTransaction))?,
            );
        }
        instructions.push(
            build_spl_transfer(&sender_account, &recipient_account, &sender, units)
                .map_err(at(TransferStage::BuildingTransaction))?,
        );

        let message = compile_transaction(&instructions, &sponsor, &block.blockhash)
            .map_err(at(TransferStage::BuildingTransaction))?;
        let mut pending =
            PendingTransaction::new(message).map_err(at(TransferStage::BuildingTransaction))?;

        debug!(stage = %TransferStage::Signing, "entering stage");
        pending
            .sign(self.config.sponsor.signing_key())
            .map_err(at(TransferStage::Signing))?;
        pending
            .sign(keypair.signing_key())
            .map_err(at(TransferStage::Signing))?;

        pending.finalize().map_err(at(TransferStage::Signing))
    }

    /// Poll until confirmed, the transaction fails, or the bound expires.
    async fn await_confirmation(&self, transaction_id: &str) -> Result<(), TransferError> {
        let poll = async {
            loop {
                match self.ledger.confirm_transaction(transaction_id).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(LedgerError::Rejected(msg)) => {
                        return Err(TransferError::SubmissionRejected(msg))
                    }
                    Err(e @ LedgerError::AddressFormat(_)) => return Err(e.into()),
                    Err(e) => warn!(%transaction_id, error = %e, "confirmation poll failed"),
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.config.confirm_timeout, poll).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransferError::ConfirmationTimeout {
                transaction_id: transaction_id.to_string(),
            }),
        }
    }
}
