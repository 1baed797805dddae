//! # engine::oracle
//!
//! **PriceOracleUpdater**: pushes external USD prices on chain.
//!
//! ## Cycle
//! ```text
//! Idle ─▶ Fetching    every registered asset: feed price → 6-decimal fixed
//!      ─▶ Submitting  one update_price transaction per asset, in order
//!      ─▶ Idle        sleep `interval`
//! ```
//! A feed failure skips that asset; a rejected or failed submission is
//! logged and the next asset proceeds. Nothing is retried within a cycle.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::find_capability;
use crate::error::AppError;
use crate::events::EngineEvent;
use crate::feed::SharedFeed;
use crate::ledger::tx::{self, UpdatePriceParams};
use crate::ledger::TransactionBlock;
use crate::math::{fixed_to_decimal, price_usd_to_fixed, USD_DECIMALS};
use crate::models::Asset;
use crate::state::{bump, SharedState};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OraclePhase {
    Idle,
    Fetching,
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceUpdate {
    pub coin_type: String,
    pub price_usd: u64,
    pub digest:    String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OracleReport {
    pub updated: Vec<PriceUpdate>,
    /// Coin types whose feed price was unavailable.
    pub skipped: Vec<String>,
    /// Coin types whose submission was rejected or never arrived.
    pub failed:  Vec<String>,
}

pub struct PriceOracleUpdater {
    state:  SharedState,
    feed:   SharedFeed,
    signer: String,
    cap_id: String,
    phase:  OraclePhase,
}

impl PriceOracleUpdater {
    /// Resolve the signer and its `Oracle` capability. Either missing is a
    /// `MissingCredential` and the loop must not start.
    pub async fn new(state: SharedState, feed: SharedFeed) -> Result<Self, AppError> {
        let signer = state.config.require_signer()?.to_string();
        let cap_id = find_capability(&state, &signer, "Oracle").await?;
        info!(signer = %signer, oracle_cap = %cap_id, "Oracle credentials resolved");
        Ok(Self { state, feed, signer, cap_id, phase: OraclePhase::Idle })
    }

    /// Look up and convert the feed price of every asset.
    async fn fetch_prices(&self, assets: Vec<Asset>, report: &mut OracleReport) -> Vec<(Asset, u64)> {
        let mut priced = Vec::with_capacity(assets.len());
        for asset in assets {
            let result = match self.feed.get_price(&asset.symbol).await {
                Ok(price) => price_usd_to_fixed(price),
                Err(e) => Err(e),
            };
            match result {
                Ok(fixed) => {
                    debug!(symbol = %asset.symbol, price_usd = fixed, "Feed price converted");
                    priced.push((asset, fixed));
                }
                Err(e) => {
                    warn!(symbol = %asset.symbol, coin_type = %asset.coin_type, error = %e, "Price unavailable — skipping asset this cycle");
                    self.state.broadcast(&EngineEvent::PriceSkipped {
                        coin_type: asset.coin_type.clone(),
                        symbol:    asset.symbol.clone(),
                        reason:    e.to_string(),
                    });
                    report.skipped.push(asset.coin_type);
                }
            }
        }
        priced
    }

    async fn submit_price(&self, asset: &Asset, price_usd: u64) -> Result<String, AppError> {
        let mut block = TransactionBlock::new(self.state.config.gas_budget);
        tx::update_price(&mut block, &self.state.config.package_id, &UpdatePriceParams {
            oracle_cap_id: &self.cap_id,
            asset_id:      &asset.id,
            coin_type:     &asset.coin_type,
            price_usd,
        });

        let result = self.state.ledger.submit(&self.signer, &block).await?;
        if !result.success {
            return Err(AppError::TransactionSubmission(format!(
                "update_price {} ({}): {}",
                asset.symbol,
                result.digest,
                result.errors.join("; ")
            )));
        }
        Ok(result.digest)
    }

    /// One full pass. Only a failure to list the assets fails the cycle.
    pub async fn run_cycle(&mut self) -> Result<OracleReport, AppError> {
        let mut report = OracleReport::default();

        self.phase = OraclePhase::Fetching;
        let assets = match self.state.registry.list_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                self.phase = OraclePhase::Idle;
                return Err(e);
            }
        };
        let priced = self.fetch_prices(assets, &mut report).await;

        self.phase = OraclePhase::Submitting;
        for (asset, price_usd) in priced {
            match self.submit_price(&asset, price_usd).await {
                Ok(digest) => {
                    info!(
                        symbol    = %asset.symbol,
                        coin_type = %asset.coin_type,
                        price_usd,
                        price     = fixed_to_decimal(price_usd, USD_DECIMALS),
                        digest    = %digest,
                        explorer  = %self.state.explorer_url(&digest),
                        "💲 Price updated"
                    );
                    self.state.broadcast(&EngineEvent::PriceUpdated {
                        coin_type: asset.coin_type.clone(),
                        symbol:    asset.symbol.clone(),
                        price_usd,
                        digest:    digest.clone(),
                    });
                    report.updated.push(PriceUpdate { coin_type: asset.coin_type, price_usd, digest });
                }
                Err(e) => {
                    error!(symbol = %asset.symbol, coin_type = %asset.coin_type, error = %e, "❌ Price update failed");
                    report.failed.push(asset.coin_type);
                }
            }
        }
        self.phase = OraclePhase::Idle;

        let stats = &self.state.stats;
        bump(&stats.oracle_cycles, 1);
        bump(&stats.prices_updated, report.updated.len() as u64);
        bump(&stats.prices_skipped, report.skipped.len() as u64);
        bump(&stats.prices_failed, report.failed.len() as u64);
        self.state.broadcast(&EngineEvent::CycleCompleted {
            loop_name: "oracle",
            succeeded: report.updated.len() as u32,
            skipped:   report.skipped.len() as u32,
            failed:    report.failed.len() as u32,
        });
        Ok(report)
    }

    /// Run until the process exits.
    pub async fn run(mut self, interval: Duration) {
        info!(interval = ?interval, signer = %self.signer, "🔮 Price oracle loop started");
        loop {
            match self.run_cycle().await {
                Ok(report) => info!(
                    updated = report.updated.len(),
                    skipped = report.skipped.len(),
                    failed  = report.failed.len(),
                    "✅ Oracle cycle complete"
                ),
                Err(e) => error!(error = %e, "❌ Oracle cycle failed — will retry next interval"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::tests::test_config;
    use crate::feed::StaticFeed;
    use crate::ledger::memory::tests::{seeded_ledger, ADMIN, PKG, SUI, USDC};
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::tx::Command;
    use crate::ledger::{
        Coin, CoinMetadata, LedgerError, LedgerEvent, LedgerGateway, LedgerObject, SharedLedger,
        SubmitResult,
    };
    use crate::state::tests::local_state;
    use crate::state::AppState;

    fn feed(table: &str) -> SharedFeed {
        Arc::new(StaticFeed::parse(table, "usdc").unwrap())
    }

    #[tokio::test]
    async fn test_cycle_updates_every_asset() {
        let state = local_state(seeded_ledger(1).await, ADMIN);
        let mut oracle = PriceOracleUpdater::new(state.clone(), feed("sui=4.2")).await.unwrap();
        let report = oracle.run_cycle().await.unwrap();

        assert_eq!(oracle.phase, OraclePhase::Idle);
        assert_eq!(report.updated.len(), 2);
        assert!(report.skipped.is_empty() && report.failed.is_empty());

        let assets = state.registry.list_assets().await.unwrap();
        let price = |ct: &str| assets.iter().find(|a| a.coin_type == ct).unwrap().price_usd;
        assert_eq!(price(SUI), 4_200_000);
        assert_eq!(price(USDC), 1_000_000);
        assert_eq!(state.stats.snapshot().prices_updated, 2);
    }

    #[tokio::test]
    async fn test_missing_feed_price_skips_only_that_asset() {
        let state = local_state(seeded_ledger(7).await, ADMIN);
        let mut oracle = PriceOracleUpdater::new(state.clone(), feed("")).await.unwrap();
        let report = oracle.run_cycle().await.unwrap();

        assert_eq!(report.skipped, vec![SUI.to_string()]);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.updated[0].coin_type, USDC);

        // sui untouched
        let sui = state.registry.get_asset(SUI).await.unwrap();
        assert_eq!(sui.price_usd, 7);
    }

    #[tokio::test]
    async fn test_requires_oracle_capability() {
        let state = local_state(MemoryLedger::new(PKG, ADMIN, SUI), ADMIN);
        let result = PriceOracleUpdater::new(state, feed("sui=1")).await;
        assert!(matches!(result, Err(AppError::MissingCredential(_))));
    }

    /// Rejects every block that calls into the contract for `coin_type`.
    struct RejectCoin {
        inner:     Arc<MemoryLedger>,
        coin_type: &'static str,
    }

    #[async_trait]
    impl LedgerGateway for RejectCoin {
        async fn get_object(&self, id: &str) -> Result<Option<LedgerObject>, LedgerError> {
            self.inner.get_object(id).await
        }
        async fn owned_objects(&self, o: &str, t: &str) -> Result<Vec<LedgerObject>, LedgerError> {
            self.inner.owned_objects(o, t).await
        }
        async fn query_events(&self, t: &str) -> Result<Vec<LedgerEvent>, LedgerError> {
            self.inner.query_events(t).await
        }
        async fn coins(&self, o: &str, t: &str) -> Result<Vec<Coin>, LedgerError> {
            self.inner.coins(o, t).await
        }
        async fn coin_metadata(&self, t: &str) -> Result<Option<CoinMetadata>, LedgerError> {
            self.inner.coin_metadata(t).await
        }
        async fn submit(&self, s: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError> {
            let touches = tx.commands.iter().any(|c| {
                matches!(c, Command::MoveCall { type_arguments, .. } if type_arguments.iter().any(|t| t == self.coin_type))
            });
            if touches {
                return Ok(SubmitResult::rejected("0xrejected", "MoveAbort in update_price"));
            }
            self.inner.submit(s, tx).await
        }
    }

    #[tokio::test]
    async fn test_rejected_submission_continues_with_next_asset() {
        let ledger = Arc::new(seeded_ledger(7).await);
        let shared: SharedLedger = Arc::new(RejectCoin { inner: ledger, coin_type: SUI });
        let state = Arc::new(AppState::new(test_config(PKG, ADMIN), shared, None, reqwest::Client::new()));
        let mut oracle = PriceOracleUpdater::new(state.clone(), feed("sui=4.2")).await.unwrap();

        let report = oracle.run_cycle().await.unwrap();
        assert_eq!(report.failed, vec![SUI.to_string()]);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.updated[0].coin_type, USDC);
        assert_eq!(oracle.phase, OraclePhase::Idle);

        assert_eq!(state.registry.get_asset(SUI).await.unwrap().price_usd, 7);
        assert_eq!(state.registry.get_asset(USDC).await.unwrap().price_usd, 1_000_000);
        assert_eq!(state.stats.snapshot().prices_failed, 1);
    }
}
