//! # config — Operator configuration from environment variables
//!
//! `.env` is loaded by `main` before this runs. Global CLI flags override the
//! values read here (see [`crate::cli::Cli::apply`]).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::ledger::normalize_coin_type;
use crate::ledger::rpc::default_rpc_url;

pub const DEFAULT_PRICE_FEED_URL: &str = "https://api.coingecko.com/api/v3";

/// Which [`crate::ledger::LedgerGateway`] backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    /// Full node JSON-RPC + signer bridge
    Rpc,
    /// In-process ledger, optionally snapshotted to `CRUMB_STATE_FILE`
    Local,
}

impl std::str::FromStr for LedgerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rpc" => Ok(LedgerKind::Rpc),
            "local" => Ok(LedgerKind::Local),
            other => bail!("Unknown CRUMB_LEDGER: '{other}'. Use 'rpc' or 'local'"),
        }
    }
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerKind::Rpc => write!(f, "rpc"),
            LedgerKind::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// devnet | testnet | mainnet; used for the node URL and explorer links
    pub network:           String,
    pub package_id:        String,
    /// Address every transaction is signed as
    pub signer_address:    Option<String>,
    pub ledger:            LedgerKind,
    pub rpc_url:           String,
    pub signer_url:        Option<String>,
    pub state_file:        Option<PathBuf>,
    /// Shared table `add_asset` registers into
    pub global_table_id:   Option<String>,
    /// CoinGecko-compatible base URL, or `static:sym=price,…`
    pub price_feed_url:    String,
    pub stablecoin_symbol: String,
    pub native_coin_type:  String,
    /// Native units kept unspent for gas when selling the native coin
    pub fee_reserve:       u64,
    pub gas_budget:        u64,
    pub metadata_ttl:      Duration,
    pub bind_addr:         String,
    pub api_key:           Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match var(key) {
                Some(v) => v.trim().parse().with_context(|| format!("{key} must be a number")),
                None => Ok(default),
            }
        };

        let network = var("CRUMB_NETWORK").unwrap_or_else(|| "devnet".to_string());
        let package_id = var("CRUMB_PACKAGE_ID")
            .context("CRUMB_PACKAGE_ID environment variable is required")?;
        let ledger: LedgerKind = var("CRUMB_LEDGER").unwrap_or_else(|| "rpc".to_string()).parse()?;

        let gas_budget = number("GAS_BUDGET", 50_000_000)?;
        if gas_budget == 0 {
            bail!("GAS_BUDGET must be positive");
        }

        Ok(Self {
            rpc_url:           var("CRUMB_RPC_URL").unwrap_or_else(|| default_rpc_url(&network)),
            network,
            package_id,
            signer_address:    var("SIGNER_ADDRESS"),
            ledger,
            signer_url:        var("CRUMB_SIGNER_URL"),
            state_file:        var("CRUMB_STATE_FILE").map(PathBuf::from),
            global_table_id:   var("CRUMB_GLOBAL_TABLE_ID"),
            price_feed_url:    var("PRICE_FEED_URL").unwrap_or_else(|| DEFAULT_PRICE_FEED_URL.to_string()),
            stablecoin_symbol: var("STABLECOIN_SYMBOL").unwrap_or_else(|| "usdc".to_string()).to_lowercase(),
            native_coin_type:  normalize_coin_type(&var("NATIVE_COIN_TYPE").unwrap_or_else(|| "0x2::sui::SUI".to_string())),
            fee_reserve:       number("FEE_RESERVE", 50_000_000)?,
            gas_budget,
            metadata_ttl:      Duration::from_secs(number("METADATA_TTL_SECS", 300)?),
            bind_addr:         var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            api_key:           var("API_KEY"),
        })
    }

    /// The signing address, or `MissingCredential` when none is configured.
    pub fn require_signer(&self) -> Result<&str, crate::error::AppError> {
        self.signer_address.as_deref().ok_or_else(|| {
            crate::error::AppError::MissingCredential("SIGNER_ADDRESS is not set".into())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Config for in-process tests against the local ledger.
    pub(crate) fn test_config(package_id: &str, signer: &str) -> Config {
        let vars: HashMap<&str, String> = [
            ("CRUMB_PACKAGE_ID", package_id.to_string()),
            ("SIGNER_ADDRESS", signer.to_string()),
            ("CRUMB_LEDGER", "local".to_string()),
            ("PRICE_FEED_URL", "static:".to_string()),
        ]
        .into();
        Config::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|k| (k == "CRUMB_PACKAGE_ID").then(|| "0xpkg".to_string())).unwrap();
        assert_eq!(config.network, "devnet");
        assert_eq!(config.ledger, LedgerKind::Rpc);
        assert_eq!(config.rpc_url, "https://fullnode.devnet.sui.io:443");
        assert_eq!(config.stablecoin_symbol, "usdc");
        assert_eq!(config.fee_reserve, 50_000_000);
        assert_eq!(config.metadata_ttl, Duration::from_secs(300));
        assert!(config.require_signer().is_err());
    }

    #[test]
    fn test_package_id_required() {
        assert!(Config::from_lookup(|_| None).is_err());
        assert!(Config::from_lookup(|k| (k == "CRUMB_PACKAGE_ID").then(String::new)).is_err());
    }

    #[test]
    fn test_bad_values_rejected() {
        let bad_ledger = |k: &str| match k {
            "CRUMB_PACKAGE_ID" => Some("0xpkg".to_string()),
            "CRUMB_LEDGER" => Some("ipfs".to_string()),
            _ => None,
        };
        assert!(Config::from_lookup(bad_ledger).is_err());

        let bad_number = |k: &str| match k {
            "CRUMB_PACKAGE_ID" => Some("0xpkg".to_string()),
            "FEE_RESERVE" => Some("lots".to_string()),
            _ => None,
        };
        assert!(Config::from_lookup(bad_number).is_err());
    }

    #[test]
    fn test_test_config() {
        let config = test_config("0xpkg", "0xop");
        assert_eq!(config.ledger, LedgerKind::Local);
        assert_eq!(config.require_signer().unwrap(), "0xop");
    }
}
