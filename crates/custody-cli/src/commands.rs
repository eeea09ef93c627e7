//! CLI command implementations.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use custody_core::{MemoryKeyStore, ServiceError, TransferResult, WalletService};
use sol_rpc::RpcClient;

use crate::Commands;

type Service = WalletService<RpcClient, MemoryKeyStore>;

/// Read a PIN from the flag, or prompt for it without echo.
fn get_pin(flag: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(pin) = flag {
        return Ok(SecretString::from(pin));
    }

    let pin = rpassword::prompt_password("PIN: ").context("Failed to read PIN")?;
    if confirm {
        let again = rpassword::prompt_password("Repeat PIN: ").context("Failed to read PIN")?;
        if pin != again {
            bail!("PINs do not match");
        }
    }
    Ok(SecretString::from(pin))
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    write_json(&mut io::stdout().lock(), value)
}

fn save(store: &MemoryKeyStore, path: &Path) -> Result<()> {
    store
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub async fn run(
    service: &Service,
    store: &MemoryKeyStore,
    store_path: &Path,
    command: Commands,
) -> Result<ExitCode> {
    match command {
        Commands::Create { name, pin } => {
            let pin = get_pin(pin, true)?;
            let summary = service.create_wallet(&name, &pin)?;
            save(store, store_path)?;
            print_json(&summary)?;
        }

        Commands::Show { name } => print_json(&service.get_wallet(&name)?)?,

        Commands::Search { term } => {
            let wallets = service.search(&term)?;
            print_json(&json!({ "count": wallets.len(), "wallets": wallets }))?;
        }

        Commands::ExportKey { name, pin } => {
            let pin = get_pin(pin, false)?;
            let secret = service.export_private_key(&name, &pin)?;
            println!("{}", &*secret);
        }

        Commands::Balance { name } => print_json(&service.native_balance(&name).await?)?,

        Commands::TokenBalance { name } => print_json(&service.token_balance(&name).await?)?,

        Commands::Send {
            sender,
            recipient,
            amount,
            pin,
        } => {
            let pin = get_pin(pin, false)?;
            return send(service, store, store_path, &sender, pin, &recipient, amount).await;
        }

        Commands::History { name } => print_json(&service.history(&name)?)?,

        Commands::ExchangeRate => print_json(&service.exchange_rate())?,
    }

    Ok(ExitCode::SUCCESS)
}

async fn send(
    service: &Service,
    store: &MemoryKeyStore,
    store_path: &Path,
    sender: &str,
    pin: SecretString,
    recipient: &str,
    amount: Decimal,
) -> Result<ExitCode> {
    let outcome = service.send_token(sender, pin, recipient, amount).await;
    let complete = report_send(&mut io::stdout().lock(), outcome, || save(store, store_path))?;

    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Persist and print the outcome of a send. Returns `true` only when the
/// transfer succeeded and its history reached disk.
///
/// A confirmed transfer always prints its transaction id, even when the
/// history could not be written.
fn report_send(
    out: &mut impl Write,
    outcome: Result<TransferResult, ServiceError>,
    persist: impl FnOnce() -> Result<()>,
) -> Result<bool> {
    match outcome {
        Ok(result) if result.success => match persist() {
            Ok(()) => {
                write_json(out, &result)?;
                Ok(true)
            }
            Err(err) => {
                let transaction_id = result.transaction_id.unwrap_or_default();
                warn!(%transaction_id, error = %format_args!("{err:#}"), "wallet store not saved after confirmed transfer");
                write_json(
                    out,
                    &history_not_recorded(&transaction_id, &result.explorer_link.unwrap_or_default()),
                )?;
                Ok(false)
            }
        },
        Ok(result) => {
            write_json(out, &result)?;
            Ok(false)
        }
        Err(ServiceError::HistoryNotRecorded {
            transaction_id,
            explorer_link,
            source,
        }) => {
            warn!(%transaction_id, error = %source, "history write failed after confirmed transfer");
            write_json(out, &history_not_recorded(&transaction_id, &explorer_link))?;
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// The tokens moved but the wallet history is stale.
fn history_not_recorded(transaction_id: &str, explorer_link: &str) -> serde_json::Value {
    json!({
        "success": true,
        "transactionId": transaction_id,
        "explorerLink": explorer_link,
        "historyRecorded": false,
    })
}
