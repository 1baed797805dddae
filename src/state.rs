//! # state
//!
//! [`AppState`]: the ledger gateway, the registry and position store built
//! on it, engine counters and the monitor broadcast channel. Shared by both
//! loops and every axum handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{Config, LedgerKind};
use crate::events::EngineEvent;
use crate::feed::{CoinGeckoFeed, SharedFeed, StaticFeed};
use crate::ledger::memory::MemoryLedger;
use crate::ledger::rpc::RpcLedger;
use crate::ledger::{explorer_url, SerializedLedger, SharedLedger};
use crate::registry::AssetRegistry;
use crate::store::PositionStore;

// ─── Engine Stats ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EngineStats {
    pub oracle_cycles:   AtomicU64,
    pub prices_updated:  AtomicU64,
    pub prices_skipped:  AtomicU64,
    pub prices_failed:   AtomicU64,
    pub executor_cycles: AtomicU64,
    pub trades_executed: AtomicU64,
    pub trades_skipped:  AtomicU64,
    pub trades_failed:   AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub oracle_cycles:   u64,
    pub prices_updated:  u64,
    pub prices_skipped:  u64,
    pub prices_failed:   u64,
    pub executor_cycles: u64,
    pub trades_executed: u64,
    pub trades_skipped:  u64,
    pub trades_failed:   u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            oracle_cycles:   get(&self.oracle_cycles),
            prices_updated:  get(&self.prices_updated),
            prices_skipped:  get(&self.prices_skipped),
            prices_failed:   get(&self.prices_failed),
            executor_cycles: get(&self.executor_cycles),
            trades_executed: get(&self.trades_executed),
            trades_skipped:  get(&self.trades_skipped),
            trades_failed:   get(&self.trades_failed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub config:       Config,

    // ── Ledger ────────────────────────────────────────────────────────────────
    /// Every submission goes through the per-identity [`SerializedLedger`].
    pub ledger:       SharedLedger,
    /// Set when running against the in-process ledger (faucet, genesis ids)
    pub local:        Option<Arc<MemoryLedger>>,
    pub registry:     AssetRegistry,
    pub store:        PositionStore,

    // ── Monitor ───────────────────────────────────────────────────────────────
    pub broadcast_tx: broadcast::Sender<String>,
    pub stats:        EngineStats,
    pub started_at:   DateTime<Utc>,

    pub http_client:  reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Config,
        ledger: SharedLedger,
        local: Option<Arc<MemoryLedger>>,
        http_client: reqwest::Client,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        Self {
            registry:     AssetRegistry::new(ledger.clone(), &config.package_id, config.metadata_ttl),
            store:        PositionStore::new(ledger.clone(), &config.package_id),
            config,
            ledger,
            local,
            broadcast_tx,
            stats:        EngineStats::default(),
            started_at:   Utc::now(),
            http_client,
        }
    }

    /// Send to every monitor client. Having none is fine.
    pub fn broadcast(&self, event: &EngineEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub fn explorer_url(&self, digest: &str) -> String {
        explorer_url(digest, &self.config.network)
    }

    /// The shared asset table: from config, or the local ledger's genesis.
    pub async fn global_table_id(&self) -> Option<String> {
        if let Some(id) = &self.config.global_table_id {
            return Some(id.clone());
        }
        match &self.local {
            Some(local) => Some(local.global_table_id().await),
            None => None,
        }
    }

    /// Price feed selected by `PRICE_FEED_URL`.
    pub fn price_feed(&self) -> Result<SharedFeed, crate::error::AppError> {
        let url = &self.config.price_feed_url;
        let stable = &self.config.stablecoin_symbol;
        let feed: SharedFeed = match url.strip_prefix("static:") {
            Some(table) => Arc::new(StaticFeed::parse(table, stable)?),
            None => Arc::new(CoinGeckoFeed::new(self.http_client.clone(), url.as_str(), stable)),
        };
        Ok(feed)
    }
}

pub type SharedState = Arc<AppState>;

/// Connect the configured ledger and assemble the shared state.
pub async fn build_state(config: Config) -> anyhow::Result<SharedState> {
    let http_client = reqwest::Client::new();

    let (ledger, local): (SharedLedger, Option<Arc<MemoryLedger>>) = match config.ledger {
        LedgerKind::Rpc => {
            info!(rpc = %config.rpc_url, signer_bridge = ?config.signer_url, "Using node ledger");
            let rpc = RpcLedger::new(http_client.clone(), config.rpc_url.clone(), config.signer_url.clone());
            let ledger: SharedLedger = Arc::new(SerializedLedger::new(rpc));
            (ledger, None)
        }
        LedgerKind::Local => {
            let admin = config
                .require_signer()
                .context("the local ledger publishes its admin cap to SIGNER_ADDRESS")?;
            let memory = match &config.state_file {
                Some(path) => {
                    MemoryLedger::open(path.clone(), &config.package_id, admin, &config.native_coin_type).await?
                }
                None => MemoryLedger::new(&config.package_id, admin, &config.native_coin_type),
            };
            let native_symbol = config.native_coin_type.rsplit("::").next().unwrap_or("SUI").to_string();
            memory
                .register_coin(&config.native_coin_type, &native_symbol, &native_symbol, 9)
                .await?;

            info!(state_file = ?config.state_file, "🧪 Using LOCAL in-process ledger");
            let memory = Arc::new(memory);
            let ledger: SharedLedger = Arc::new(SerializedLedger::new(memory.clone()));
            (ledger, Some(memory))
        }
    };

    Ok(Arc::new(AppState::new(config, ledger, local, http_client)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::ledger::memory::tests::PKG;

    /// State over an existing local ledger.
    pub(crate) fn local_state(memory: MemoryLedger, signer: &str) -> SharedState {
        let memory = Arc::new(memory);
        let ledger: SharedLedger = Arc::new(SerializedLedger::new(memory.clone()));
        Arc::new(AppState::new(test_config(PKG, signer), ledger, Some(memory), reqwest::Client::new()))
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = EngineStats::default();
        bump(&stats.trades_executed, 2);
        bump(&stats.oracle_cycles, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.trades_executed, 2);
        assert_eq!(snap.oracle_cycles, 1);
        assert_eq!(snap.trades_failed, 0);
    }

    #[tokio::test]
    async fn test_build_local_state() {
        let state = build_state(test_config(PKG, "0xop")).await.unwrap();
        assert!(state.local.is_some());
        assert!(state.global_table_id().await.is_some());
        let meta = state.registry.coin_metadata("0x2::sui::SUI").await.unwrap();
        assert_eq!(meta.symbol, "SUI");
        assert_eq!(meta.decimals, 9);
    }
}
