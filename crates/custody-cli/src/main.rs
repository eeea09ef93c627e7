//! Custody command-line interface.
//!
//! Registers PIN-protected wallets and sends the configured SPL token
//! between them, with every fee and rent payment covered by the sponsor
//! identity loaded from the environment.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroize;

use custody_core::config::DEFAULT_MINT;
use custody_core::{Cluster, CustodyConfig, MemoryKeyStore, SponsorIdentity, WalletService};
use sol_rpc::RpcClient;

mod commands;

/// Sponsored SPL token custody
#[derive(Parser)]
#[command(name = "custody")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Sponsor secret key, Base58 or a JSON array of 64 bytes
    #[arg(long, env = "SPONSOR_SECRET_KEY", hide_env_values = true)]
    sponsor_secret_key: String,

    /// Cluster used for explorer links and the default RPC endpoint
    #[arg(long, env = "SOLANA_CLUSTER", default_value = "devnet")]
    cluster: Cluster,

    /// RPC endpoint; defaults to the cluster's public endpoint
    #[arg(long, env = "SOLANA_RPC_URL")]
    rpc_url: Option<String>,

    /// Mint of the token being transferred
    #[arg(long, env = "TOKEN_MINT", default_value = DEFAULT_MINT)]
    token_mint: String,

    /// Token symbol shown in balances and history
    #[arg(long, env = "TOKEN_SYMBOL", default_value = "USDC")]
    token_symbol: String,

    /// Decimal places of the mint
    #[arg(long, env = "TOKEN_DECIMALS", default_value_t = 6)]
    token_decimals: u32,

    /// Quote currency for the exchange-rate command
    #[arg(long, env = "FIAT_CURRENCY", default_value = "KES")]
    fiat_currency: String,

    /// Token-to-fiat display rate
    #[arg(long, env = "FIAT_RATE", default_value = "129")]
    fiat_rate: Decimal,

    /// How long to wait for a submitted transfer to confirm
    #[arg(long, env = "CONFIRM_TIMEOUT_SECS", default_value_t = 60)]
    confirm_timeout_secs: u64,

    /// Wallet snapshot file
    #[arg(long, env = "WALLET_STORE", default_value = "wallets.json")]
    wallet_store: PathBuf,

    /// Log level for the custody crates
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new wallet under a 4-digit PIN
    Create {
        name: String,

        /// PIN for scripted use; the flag is visible in the process list,
        /// so prefer CUSTODY_PIN or the prompt
        #[arg(long, env = "CUSTODY_PIN", hide_env_values = true)]
        pin: Option<String>,
    },

    /// Show a wallet's address
    Show { name: String },

    /// Find wallets whose name contains a fragment
    Search { term: String },

    /// Print a wallet's decrypted secret key as hex
    ExportKey {
        name: String,

        /// PIN for scripted use; the flag is visible in the process list,
        /// so prefer CUSTODY_PIN or the prompt
        #[arg(long, env = "CUSTODY_PIN", hide_env_values = true)]
        pin: Option<String>,
    },

    /// Native SOL balance
    Balance { name: String },

    /// Balance of the configured token
    TokenBalance { name: String },

    /// Send tokens from one registered wallet to another
    Send {
        sender: String,
        recipient: String,
        amount: Decimal,

        /// PIN for scripted use; the flag is visible in the process list,
        /// so prefer CUSTODY_PIN or the prompt
        #[arg(long, env = "CUSTODY_PIN", hide_env_values = true)]
        pin: Option<String>,
    },

    /// Transfer history of a wallet
    History { name: String },

    /// Configured token-to-fiat display rate
    ExchangeRate,
}

impl Cli {
    fn custody_config(&mut self) -> Result<CustodyConfig> {
        let sponsor = SponsorIdentity::from_secret(self.sponsor_secret_key.trim())
            .context("SPONSOR_SECRET_KEY is not a usable keypair");
        self.sponsor_secret_key.zeroize();

        let config = CustodyConfig::new(sponsor?)
            .with_cluster(self.cluster)
            .with_mint(&self.token_mint)
            .context("TOKEN_MINT is not a valid address")?
            .with_token(&self.token_symbol, self.token_decimals)
            .context("invalid token settings")?
            .with_fiat_rate(&self.fiat_currency, self.fiat_rate)
            .context("invalid exchange rate settings")?
            .with_confirm_timeout(Duration::from_secs(self.confirm_timeout_secs));
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let mut cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &cli.log_level;
                format!("custody={level},custody_core={level},sol_rpc={level},warn").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.custody_config()?;
    let rpc_url = cli
        .rpc_url
        .clone()
        .unwrap_or_else(|| config.cluster.default_rpc_url().to_string());

    let ledger = Arc::new(RpcClient::new(rpc_url).context("failed to build RPC client")?);

    info!(
        sponsor = %config.sponsor.address(),
        cluster = %config.cluster,
        mint = %config.mint_address(),
        rpc = %ledger.url(),
        "custody configured"
    );
    let store = Arc::new(
        MemoryKeyStore::load(&cli.wallet_store)
            .with_context(|| format!("failed to load {}", cli.wallet_store.display()))?,
    );
    let service = WalletService::new(ledger, store.clone(), Arc::new(config));

    commands::run(&service, &store, &cli.wallet_store, cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    const SECRET: &str = "not-a-key";

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["custody", "--sponsor-secret-key", SECRET];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn send_parses_decimal_amount() {
        let cli = parse(&["send", "alice", "bob", "2.50", "--pin", "1234"]);
        match cli.command {
            Commands::Send {
                sender,
                recipient,
                amount,
                pin,
            } => {
                assert_eq!(sender, "alice");
                assert_eq!(recipient, "bob");
                assert_eq!(amount, Decimal::new(250, 2));
                assert_eq!(pin.as_deref(), Some("1234"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn malformed_amount_is_a_usage_error() {
        let argv = ["custody", "--sponsor-secret-key", SECRET, "send", "a", "b", "ten"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn unknown_cluster_is_a_usage_error() {
        let argv = [
            "custody",
            "--sponsor-secret-key",
            SECRET,
            "--cluster",
            "localnet",
            "show",
            "alice",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn pin_can_come_from_a_hidden_env_var() {
        let command = Cli::command();
        for name in ["create", "export-key", "send"] {
            let sub = command.find_subcommand(name).unwrap();
            let pin = sub.get_arguments().find(|a| a.get_id() == "pin").unwrap();
            assert_eq!(pin.get_env(), Some(std::ffi::OsStr::new("CUSTODY_PIN")));
            assert!(pin.is_hide_env_values_set());
        }
    }

    #[test]
    fn exchange_rate_defaults_to_kes() {
        let cli = parse(&["exchange-rate"]);
        assert!(matches!(cli.command, Commands::ExchangeRate));
        assert_eq!(cli.fiat_currency, "KES");
        assert_eq!(cli.fiat_rate, Decimal::from(129));
    }

    #[test]
    fn bad_sponsor_fails_and_clears_the_secret() {
        let mut cli = parse(&["show", "alice"]);
        assert!(cli.custody_config().is_err());
        assert!(cli.sponsor_secret_key.is_empty());
    }
}
