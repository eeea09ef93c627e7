//! JSON-RPC 2.0 implementation of [`LedgerClient`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use chain_sol::{address_to_bytes, validate_address};

use crate::client::{AccountInfo, BlockRef, LedgerClient};
use crate::error::LedgerError;

/// Commitment level used for every query and for preflight.
pub const COMMITMENT: &str = "confirmed";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// `{ "context": {...}, "value": ... }` wrapper used by most query methods.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    /// `[payload, encoding]`
    data: (String, String),
    executable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

enum CallFailure {
    Transport(String),
    Rpc { code: i64, message: String },
    Decode(String),
}

impl CallFailure {
    /// Map a failure on a read-only query.
    fn into_query_error(self) -> LedgerError {
        match self {
            CallFailure::Transport(msg) => LedgerError::Network(msg),
            CallFailure::Rpc { code, message } => {
                LedgerError::Network(format!("rpc error {code}: {message}"))
            }
            CallFailure::Decode(msg) => LedgerError::InvalidResponse(msg),
        }
    }
}

impl TryFrom<RpcAccount> for AccountInfo {
    type Error = LedgerError;

    fn try_from(account: RpcAccount) -> Result<Self, Self::Error> {
        let (payload, encoding) = account.data;
        if encoding != "base64" {
            return Err(LedgerError::InvalidResponse(format!(
                "unexpected account data encoding: {encoding}"
            )));
        }

        let data = BASE64
            .decode(payload)
            .map_err(|e| LedgerError::InvalidResponse(format!("account data: {e}")))?;
        let owner = address_to_bytes(&account.owner)
            .map_err(|e| LedgerError::InvalidResponse(format!("account owner: {e}")))?;

        Ok(AccountInfo {
            lamports: account.lamports,
            owner,
            data,
            executable: account.executable,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP JSON-RPC client for a Solana cluster endpoint.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, LedgerError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// `timeout` bounds each HTTP round trip, not confirmation.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sol-custody/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LedgerError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, CallFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let parsed: RpcResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                CallFailure::Decode(format!("{method}: {e}"))
            } else {
                CallFailure::Transport(format!("{method}: http status {status}"))
            }
        })?;

        if let Some(err) = parsed.error {
            warn!(method, id, code = err.code, message = %err.message, "rpc error");
            return Err(CallFailure::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| CallFailure::Decode(format!("{method}: response has no result")))
    }
}

fn check_address(address: &str) -> Result<(), LedgerError> {
    validate_address(address).map_err(|e| LedgerError::AddressFormat(e.to_string()))
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        check_address(address)?;

        let balance: WithContext<u64> = self
            .call("getBalance", json!([address, { "commitment": COMMITMENT }]))
            .await
            .map_err(CallFailure::into_query_error)?;
        Ok(balance.value)
    }

    async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>, LedgerError> {
        check_address(address)?;

        let info: WithContext<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": COMMITMENT }]),
            )
            .await
            .map_err(CallFailure::into_query_error)?;

        info.value.map(AccountInfo::try_from).transpose()
    }

    async fn get_latest_block_reference(&self) -> Result<BlockRef, LedgerError> {
        let latest: WithContext<RpcBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await
            .map_err(CallFailure::into_query_error)?;

        let blockhash = address_to_bytes(&latest.value.blockhash)
            .map_err(|e| LedgerError::InvalidResponse(format!("blockhash: {e}")))?;

        Ok(BlockRef {
            blockhash,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn submit_transaction(&self, wire: &[u8]) -> Result<String, LedgerError> {
        let encoded = BASE64.encode(wire);

        let signature: String = self
            .call(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base64",
                    "skipPreflight": false,
                    "preflightCommitment": COMMITMENT,
                }]),
            )
            .await
            .map_err(|failure| match failure {
                CallFailure::Rpc { message, .. } => LedgerError::Rejected(message),
                other => other.into_query_error(),
            })?;

        debug!(%signature, "transaction submitted");
        Ok(signature)
    }

    async fn confirm_transaction(&self, transaction_id: &str) -> Result<bool, LedgerError> {
        let decoded = bs58::decode(transaction_id)
            .into_vec()
            .map_err(|e| LedgerError::AddressFormat(format!("transaction id: {e}")))?;
        if decoded.len() != 64 {
            return Err(LedgerError::AddressFormat(format!(
                "transaction id: expected 64 bytes, got {}",
                decoded.len()
            )));
        }

        let statuses: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[transaction_id], { "searchTransactionHistory": false }]),
            )
            .await
            .map_err(CallFailure::into_query_error)?;

        match statuses.value.into_iter().next().flatten() {
            None => Ok(false),
            Some(status) => status_is_confirmed(status),
        }
    }
}

fn status_is_confirmed(status: RpcSignatureStatus) -> Result<bool, LedgerError> {
    if let Some(err) = status.err.filter(|e| !e.is_null()) {
        return Err(LedgerError::Rejected(format!("transaction failed: {err}")));
    }

    Ok(matches!(
        status.confirmation_status.as_deref(),
        Some("confirmed") | Some("finalized")
    ))
}
