//! Process configuration handed to the orchestrator and wallet service.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use chain_sol::{address_to_bytes, bytes_to_address};

use crate::error::ConfigError;

/// Devnet USDC mint.
pub const DEFAULT_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";
pub const DEFAULT_DECIMALS: u32 = 6;
pub const DEFAULT_SYMBOL: &str = "USDC";
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_FIAT_CURRENCY: &str = "KES";
/// Fixed display rate: one token unit in [`DEFAULT_FIAT_CURRENCY`].
pub const DEFAULT_FIAT_RATE: Decimal = Decimal::from_parts(129, 0, 0, false, 0);

/// Largest token precision that still fits one whole unit in a `u64`.
pub const MAX_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::MainnetBeta => "mainnet-beta",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }

    pub fn explorer_link(&self, transaction_id: &str) -> String {
        match self {
            Cluster::MainnetBeta => format!("https://solscan.io/tx/{transaction_id}"),
            other => format!(
                "https://solscan.io/tx/{transaction_id}?cluster={}",
                other.as_str()
            ),
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            other => Err(ConfigError::UnknownCluster(other.to_string())),
        }
    }
}

/// The fee-paying identity shared by every transfer in the process.
pub struct SponsorIdentity {
    signing: SigningKey,
}

impl SponsorIdentity {
    /// Parse a 64-byte keypair given as Base58 or as a JSON byte array.
    pub fn from_secret(secret: &str) -> Result<Self, ConfigError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::InvalidSponsorSecret("secret is empty".into()));
        }

        let bytes: Zeroizing<Vec<u8>> = if secret.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(secret)
                .map(Zeroizing::new)
                .map_err(|_| {
                    ConfigError::InvalidSponsorSecret("expected a JSON array of bytes".into())
                })?
        } else {
            bs58::decode(secret)
                .into_vec()
                .map(Zeroizing::new)
                .map_err(|_| ConfigError::InvalidSponsorSecret("expected Base58".into()))?
        };

        let keypair: &[u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            ConfigError::InvalidSponsorSecret(format!("expected 64 bytes, got {}", bytes.len()))
        })?;

        let signing = SigningKey::from_keypair_bytes(keypair).map_err(|_| {
            ConfigError::InvalidSponsorSecret("public key does not match secret key".into())
        })?;

        Ok(Self { signing })
    }

    pub fn from_signing_key(signing: SigningKey) -> Self {
        Self { signing }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn address(&self) -> String {
        bytes_to_address(&self.public_key())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl fmt::Debug for SponsorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SponsorIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Everything a transfer needs that is fixed for the life of the process.
#[derive(Debug)]
pub struct CustodyConfig {
    pub sponsor: SponsorIdentity,
    pub mint: [u8; 32],
    pub decimals: u32,
    pub symbol: String,
    pub cluster: Cluster,
    /// Upper bound on waiting for confirmation after a successful submit.
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    /// Quote currency for [`CustodyConfig::fiat_rate`].
    pub fiat_currency: String,
    /// Static conversion shown to users; never used when moving tokens.
    pub fiat_rate: Decimal,
}

impl CustodyConfig {
    /// Devnet USDC defaults around `sponsor`.
    pub fn new(sponsor: SponsorIdentity) -> Self {
        Self {
            sponsor,
            mint: DEVNET_USDC_MINT,
            decimals: DEFAULT_DECIMALS,
            symbol: DEFAULT_SYMBOL.to_string(),
            cluster: Cluster::default(),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fiat_currency: DEFAULT_FIAT_CURRENCY.to_string(),
            fiat_rate: DEFAULT_FIAT_RATE,
        }
    }

    pub fn with_mint(mut self, mint: &str) -> Result<Self, ConfigError> {
        self.mint = address_to_bytes(mint).map_err(|e| ConfigError::InvalidMint(e.to_string()))?;
        Ok(self)
    }

    pub fn with_token(mut self, symbol: &str, decimals: u32) -> Result<Self, ConfigError> {
        if decimals > MAX_DECIMALS {
            return Err(ConfigError::InvalidMint(format!(
                "decimals {decimals} exceeds {MAX_DECIMALS}"
            )));
        }
        self.symbol = symbol.to_string();
        self.decimals = decimals;
        Ok(self)
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fiat_rate(mut self, currency: &str, rate: Decimal) -> Result<Self, ConfigError> {
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(ConfigError::InvalidExchangeRate("currency is empty".into()));
        }
        if rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidExchangeRate(format!(
                "rate must be positive, got {rate}"
            )));
        }
        self.fiat_currency = currency.to_ascii_uppercase();
        self.fiat_rate = rate;
        Ok(self)
    }

    pub fn mint_address(&self) -> String {
        bytes_to_address(&self.mint)
    }
}

/// [`DEFAULT_MINT`] decoded.
const DEVNET_USDC_MINT: [u8; 32] = [
    0x3b, 0x44, 0x2c, 0xb3, 0x91, 0x21, 0x57, 0xf1, 0x3a, 0x93, 0x3d, 0x01, 0x34, 0x28, 0x2d, 0x03,
    0x2b, 0x5f, 0xfe, 0xcd, 0x01, 0xa2, 0xdb, 0xf1, 0xb7, 0x79, 0x06, 0x08, 0xdf, 0x00, 0x2e, 0xa7,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[0x42; 32])
    }

    #[test]
    fn fiat_rate_defaults_and_validation() {
        let config = CustodyConfig::new(SponsorIdentity::from_signing_key(test_key()));
        assert_eq!(config.fiat_currency, "KES");
        assert_eq!(config.fiat_rate, Decimal::from(129));

        let config = config.with_fiat_rate(" ngn ", Decimal::new(15505, 1)).unwrap();
        assert_eq!(config.fiat_currency, "NGN");
        assert_eq!(config.fiat_rate, Decimal::new(15505, 1));

        let rejected = [
            ("KES", Decimal::ZERO),
            ("KES", Decimal::NEGATIVE_ONE),
            ("  ", Decimal::ONE),
        ];
        for (currency, rate) in rejected {
            let config = CustodyConfig::new(SponsorIdentity::from_signing_key(test_key()));
            assert!(matches!(
                config.with_fiat_rate(currency, rate),
                Err(ConfigError::InvalidExchangeRate(_))
            ));
        }
    }

    #[test]
    fn default_mint_constant_matches_address() {
        assert_eq!(bytes_to_address(&DEVNET_USDC_MINT), DEFAULT_MINT);
    }

    #[test]
    fn sponsor_from_base58() {
        let key = test_key();
        let secret = bs58::encode(key.to_keypair_bytes()).into_string();

        let sponsor = SponsorIdentity::from_secret(&secret).unwrap();
        assert_eq!(sponsor.public_key(), key.verifying_key().to_bytes());
    }

    #[test]
    fn sponsor_from_json_array() {
        let key = test_key();
        let secret = serde_json::to_string(&key.to_keypair_bytes().to_vec()).unwrap();

        let sponsor = SponsorIdentity::from_secret(&secret).unwrap();
        assert_eq!(sponsor.address(), bytes_to_address(&key.verifying_key().to_bytes()));
    }

    #[test]
    fn sponsor_rejects_malformed_secrets() {
        let key = test_key();
        let mut mismatched = key.to_keypair_bytes();
        mismatched[63] ^= 0x01;

        let cases = [
            String::new(),
            "   ".to_string(),
            "not base58 0OIl".to_string(),
            bs58::encode([1u8; 32]).into_string(),
            "[1, 2, 3]".to_string(),
            "[1, 2,".to_string(),
            bs58::encode(mismatched).into_string(),
        ];

        for secret in cases {
            assert!(
                matches!(
                    SponsorIdentity::from_secret(&secret),
                    Err(ConfigError::InvalidSponsorSecret(_))
                ),
                "accepted {secret:?}"
            );
        }
    }

    #[test]
    fn sponsor_debug_hides_secret() {
        let sponsor = SponsorIdentity::from_signing_key(test_key());
        let debug = format!("{sponsor:?}");
        assert!(debug.contains(&sponsor.address()));
        assert!(!debug.contains("signing"));
    }

    #[test]
    fn cluster_parse_and_links() {
        assert_eq!("devnet".parse::<Cluster>().unwrap(), Cluster::Devnet);
        assert_eq!("Mainnet-Beta".parse::<Cluster>().unwrap(), Cluster::MainnetBeta);
        assert!("localnet".parse::<Cluster>().is_err());

        assert_eq!(
            Cluster::Devnet.explorer_link("5abc"),
            "https://solscan.io/tx/5abc?cluster=devnet"
        );
        assert_eq!(
            Cluster::MainnetBeta.explorer_link("5abc"),
            "https://solscan.io/tx/5abc"
        );
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = CustodyConfig::new(SponsorIdentity::from_signing_key(test_key()));
        assert_eq!(config.mint_address(), DEFAULT_MINT);
        assert_eq!(config.decimals, 6);
        assert_eq!(config.symbol, "USDC");
        assert_eq!(config.cluster, Cluster::Devnet);
        assert_eq!(config.confirm_timeout, Duration::from_secs(60));

        let config = config
            .with_mint("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA")
            .unwrap()
            .with_token("TEST", 9)
            .unwrap()
            .with_cluster(Cluster::Testnet);
        assert_eq!(config.decimals, 9);
        assert_eq!(config.cluster, Cluster::Testnet);
    }

    #[test]
    fn config_rejects_bad_mint_and_decimals() {
        let config = CustodyConfig::new(SponsorIdentity::from_signing_key(test_key()));
        let config = config.with_token("X", 19);
        assert!(config.is_err());

        let config = CustodyConfig::new(SponsorIdentity::from_signing_key(test_key()));
        assert!(matches!(
            config.with_mint("nope"),
            Err(ConfigError::InvalidMint(_))
        ));
    }
}
