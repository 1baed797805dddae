//! # cli — Operator command line
//!
//! ```bash
//! crumb assets
//! crumb add-asset 0x2::sui::SUI
//! crumb add-price-oracle 0xOPERATOR
//! crumb run --coin 0x…::usdc::USDC
//! crumb --ledger local create-position --input 0x…::usdc::USDC --output 0x2::sui::SUI \
//!       --deposit 100 --amount-per-trade 10 --frequency 86400
//! ```
//!
//! Global flags override the matching environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{Config, LedgerKind};
use crate::engine::{oracle, scheduler};

#[derive(Parser, Debug)]
#[command(name = "crumb", version, about = "Crumb DCA operator: price oracle updater and trade executor")]
pub struct Cli {
    /// devnet | testnet | mainnet
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// rpc | local
    #[arg(long, global = true)]
    pub ledger: Option<String>,

    /// Address to sign as
    #[arg(long, global = true)]
    pub signer: Option<String>,

    /// Local ledger snapshot file
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered assets and their oracle prices
    Assets,

    /// List live positions
    Positions {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Register a coin type as a tradable asset (admin)
    AddAsset {
        coin_type: String,
    },

    /// Grant the oracle capability to an address (admin)
    AddPriceOracle {
        address: String,
    },

    /// Push feed prices on chain every interval
    RunPriceOracle {
        /// Seconds between cycles
        #[arg(long, env = "ORACLE_INTERVAL_SECS", default_value_t = oracle::DEFAULT_INTERVAL.as_secs())]
        interval: u64,
    },

    /// Sell `--coin` into every due position every interval
    RunExecutor {
        #[arg(long, env = "EXECUTOR_INTERVAL_SECS", default_value_t = scheduler::DEFAULT_INTERVAL.as_secs())]
        interval: u64,

        /// Output coin type the operator sells
        #[arg(long, env = "EXECUTOR_COIN")]
        coin: String,

        /// Hand over the whole merged balance on each trade
        #[arg(long)]
        max: bool,
    },

    /// Oracle loop, executor loop and the read API in one process
    Run {
        #[arg(long, env = "ORACLE_INTERVAL_SECS", default_value_t = oracle::DEFAULT_INTERVAL.as_secs())]
        oracle_interval: u64,

        #[arg(long, env = "EXECUTOR_INTERVAL_SECS", default_value_t = scheduler::DEFAULT_INTERVAL.as_secs())]
        executor_interval: u64,

        #[arg(long, env = "EXECUTOR_COIN")]
        coin: String,

        #[arg(long)]
        max: bool,
    },

    /// Open a DCA position from the signer's coins
    CreatePosition {
        /// Coin type deposited and paid out on each trade
        #[arg(long)]
        input: String,

        /// Coin type bought
        #[arg(long)]
        output: String,

        /// Whole input tokens
        #[arg(long)]
        deposit: f64,

        #[arg(long)]
        amount_per_trade: f64,

        /// Seconds between trades
        #[arg(long)]
        frequency: u64,
    },

    /// Withdraw the remaining deposit of a position
    Withdraw {
        position_id: String,
    },

    /// Close an emptied position and collect what it bought
    ClosePosition {
        position_id: String,
    },

    /// Serve the read API only
    Serve,

    /// Local ledger faucet
    Mint {
        coin_type: String,

        /// Whole tokens
        amount: f64,

        /// Recipient, defaults to the signer
        #[arg(long)]
        to: Option<String>,

        /// Publish coin metadata with this symbol if the type is new
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value_t = 9)]
        decimals: u32,
    },
}

impl Cli {
    /// Layer the global flags over `config`.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(ledger) = &self.ledger {
            config.ledger = ledger.parse::<LedgerKind>()?;
        }
        if let Some(signer) = &self.signer {
            config.signer_address = Some(signer.clone());
        }
        if let Some(path) = &self.state_file {
            config.state_file = Some(path.clone());
        }
        Ok(())
    }
}

pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}
