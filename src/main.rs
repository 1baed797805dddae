//! # Crumb — DCA Operator
//!
//! ```text
//!  ┌─────────────┐  {symbol → USD}   ┌──────────────────────┐ update_price
//!  │ Price feed  │ ────────────────▶ │ PriceOracleUpdater   │ ───────────┐
//!  └─────────────┘                   └──────────────────────┘            ▼
//!                                    ┌──────────────────────┐      ┌──────────┐
//!   PositionStore / AssetRegistry ─▶ │ TradeScheduler       │ ───▶ │  Ledger  │
//!                                    └──────────────────────┘      └──────────┘
//!                                               │ EngineEvent
//!  ┌─────────────┐  ws://host/ws/monitor        ▼
//!  │  Dashboard  │ ◀──────────────────── broadcast_tx
//!  └─────────────┘  GET /api/{assets,positions,stats}
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod ledger;
mod math;
mod models;
mod registry;
mod routes;
mod state;
mod store;

use cli::{secs, Cli, Command};
use config::Config;
use engine::{PriceOracleUpdater, TradeScheduler};
use math::format_fixed;
use state::{build_state, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("crumb=debug".parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // ── 3. Config + shared state ──────────────────────────────────────────────
    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config)?;
    info!(network = %config.network, ledger = %config.ledger, package = %config.package_id, "Configuration loaded");

    let state = build_state(config).await.context("Failed to connect ledger")?;

    // ── 4. Dispatch ───────────────────────────────────────────────────────────
    match cli.command {
        Command::Assets => print_assets(&state).await?,
        Command::Positions { owner } => print_positions(&state, owner.as_deref()).await?,

        Command::AddAsset { coin_type } => {
            commands::add_asset(&state, &coin_type).await?;
        }
        Command::AddPriceOracle { address } => {
            commands::add_price_oracle(&state, &address).await?;
        }

        Command::RunPriceOracle { interval } => {
            banner();
            let oracle = PriceOracleUpdater::new(state.clone(), state.price_feed()?)
                .await
                .context("Cannot start the price oracle")?;
            oracle.run(secs(interval)).await;
        }
        Command::RunExecutor { interval, coin, max } => {
            banner();
            let scheduler = TradeScheduler::new(state.clone(), coin, max).context("Cannot start the executor")?;
            scheduler.run(secs(interval)).await;
        }
        Command::Run { oracle_interval, executor_interval, coin, max } => {
            banner();
            let oracle = PriceOracleUpdater::new(state.clone(), state.price_feed()?)
                .await
                .context("Cannot start the price oracle")?;
            let scheduler = TradeScheduler::new(state.clone(), coin, max).context("Cannot start the executor")?;

            tokio::spawn(oracle.run(secs(oracle_interval)));
            tokio::spawn(scheduler.run(secs(executor_interval)));
            serve(state).await?;
        }
        Command::Serve => {
            banner();
            serve(state).await?;
        }

        Command::CreatePosition { input, output, deposit, amount_per_trade, frequency } => {
            let req = commands::CreatePosition {
                input_coin_type:  input,
                output_coin_type: output,
                deposit,
                amount_per_trade,
                frequency_secs:   frequency,
            };
            commands::create_position(&state, &req).await?;
        }
        Command::Withdraw { position_id } => {
            commands::withdraw(&state, &position_id).await?;
        }
        Command::ClosePosition { position_id } => {
            commands::close_position(&state, &position_id).await?;
        }
        Command::Mint { coin_type, amount, to, symbol, decimals } => {
            let to = match to {
                Some(to) => to,
                None => state.config.require_signer()?.to_string(),
            };
            let req = commands::Mint { to, coin_type, amount, symbol, decimals };
            let coin_id = commands::mint(&state, &req).await?;
            println!("{coin_id}");
        }
    }

    Ok(())
}

fn banner() {
    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║               CRUMB — DCA Operator                    ║
  ║     Price Oracle · Trade Executor · Monitor API       ║
  ╚═══════════════════════════════════════════════════════╝"#);
}

async fn serve(state: SharedState) -> anyhow::Result<()> {
    let addr: SocketAddr = state
        .config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid BIND_ADDR '{}'", state.config.bind_addr))?;

    let app = routes::router(state);

    info!(?addr, "🚀 Crumb API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "API server stopped");
        return Err(e.into());
    }
    Ok(())
}

// ─── Listings ─────────────────────────────────────────────────────────────────

async fn print_assets(state: &SharedState) -> anyhow::Result<()> {
    let assets = state.registry.list_assets().await?;
    if assets.is_empty() {
        println!("No assets registered");
        return Ok(());
    }

    println!("{:<8} {:>14} {:>8}  {:<46} {}", "SYMBOL", "PRICE (USD)", "DEC", "ASSET ID", "COIN TYPE");
    for asset in &assets {
        println!(
            "{:<8} {:>14} {:>8}  {:<46} {}",
            asset.symbol.to_uppercase(),
            asset.display_price(),
            asset.decimals,
            asset.id,
            asset.coin_type
        );
    }
    Ok(())
}

async fn print_positions(state: &SharedState, owner: Option<&str>) -> anyhow::Result<()> {
    let positions = state.store.list(owner).await?;
    if positions.is_empty() {
        println!("No live positions");
        return Ok(());
    }

    let assets = state.registry.list_assets().await?;
    let decimals = |coin_type: &str| {
        registry::find_asset(&assets, coin_type)
            .map(|a| a.decimals)
            .unwrap_or(0)
    };

    let now = chrono::Utc::now();
    for p in &positions {
        let next = match p.next_trade_at(now) {
            Some(at) if at <= now => "due".to_string(),
            Some(at) => at.to_rfc3339(),
            None => "exhausted".to_string(),
        };
        println!(
            "{}\n  owner     {}\n  {} → {}\n  deposit   {} (per trade {}, every {}s)\n  received  {}\n  next      {}",
            p.id,
            p.owner,
            p.input_coin_type,
            p.output_coin_type,
            format_fixed(p.deposit, decimals(&p.input_coin_type), None),
            format_fixed(p.amount_per_trade, decimals(&p.input_coin_type), None),
            p.frequency_seconds,
            format_fixed(p.received, decimals(&p.output_coin_type), None),
            next,
        );
    }
    Ok(())
}
