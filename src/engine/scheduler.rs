//! # engine::scheduler
//!
//! **TradeScheduler**: sells the operator's coins of one output type into
//! every DCA position that is due.
//!
//! ## Per cycle
//! ```text
//! 1. Full refresh of positions (minus the skip-set) and assets
//! 2. Keep positions whose output coin is the configured coin
//! 3. deposit == 0            → add to skip-set forever, never read again
//!    not due yet             → leave for a later cycle
//! 4. trade amount            = min(amount_per_trade, deposit) × in_price / out_price
//! 5. merge operator coins, split trade amount (or everything in max mode),
//!    submit execute_trade, invalidate the cached position
//! ```
//! A failure on one position (unknown asset, short balance, rejection) is
//! logged and the next position proceeds.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::EngineEvent;
use crate::ledger::tx::{self, CoinAmount, ExecuteTradeParams, Payment};
use crate::ledger::{normalize_coin_type, TransactionBlock};
use crate::math::trade_out_amount;
use crate::models::{Asset, Position};
use crate::registry::find_asset;
use crate::state::{bump, SharedState};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

// ─── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeReceipt {
    pub trade_id:     Uuid,
    pub position_id:  String,
    /// Input units the position pays out
    pub input_amount: u64,
    /// Output units sold into the position
    pub trade_amount: u64,
    pub digest:       String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorReport {
    /// Positions selling into the configured coin that were evaluated.
    pub considered: u32,
    pub executed:   Vec<TradeReceipt>,
    pub not_due:    u32,
    /// Due but nothing to sell (zero trade amount).
    pub skipped:    u32,
    pub failed:     u32,
    /// Positions first seen empty this cycle, now in the skip-set.
    pub exhausted:  u32,
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

pub struct TradeScheduler {
    state:     SharedState,
    signer:    String,
    /// Canonical form, see [`normalize_coin_type`].
    coin_type: String,
    max_mode:  bool,
    /// Ids of positions observed with `deposit == 0`. Only grows.
    skip:      HashSet<String>,
}

impl TradeScheduler {
    pub fn new(state: SharedState, coin_type: impl AsRef<str>, max_mode: bool) -> Result<Self, AppError> {
        let signer = state.config.require_signer()?.to_string();
        Ok(Self {
            state,
            signer,
            coin_type: normalize_coin_type(coin_type.as_ref()),
            max_mode,
            skip: HashSet::new(),
        })
    }

    /// One full pass at the current time.
    pub async fn run_cycle(&mut self) -> Result<ExecutorReport, AppError> {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<ExecutorReport, AppError> {
        let positions = self.state.store.refresh(&self.skip).await?;
        let assets = self.state.registry.list_assets().await?;
        let mut report = ExecutorReport::default();

        let coin_type = self.coin_type.clone();
        for position in positions.iter().filter(|p| p.output_coin_type == coin_type) {
            report.considered += 1;

            if position.is_terminal() {
                debug!(position_id = %position.id, "Position exhausted — skipping from now on");
                self.skip.insert(position.id.clone());
                report.exhausted += 1;
                continue;
            }
            if !position.is_eligible_at(now) {
                debug!(position_id = %position.id, next_trade_at = ?position.next_trade_at(now), "Not due");
                report.not_due += 1;
                continue;
            }

            let trade_id = Uuid::new_v4();
            match self.execute(position, &assets, trade_id).await {
                Ok(Some(receipt)) => report.executed.push(receipt),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!(position_id = %position.id, trade_id = %trade_id, error = %e, "❌ Trade failed");
                    self.state.broadcast(&EngineEvent::TradeFailed {
                        trade_id,
                        position_id: position.id.clone(),
                        reason:      e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        let stats = &self.state.stats;
        bump(&stats.executor_cycles, 1);
        bump(&stats.trades_executed, report.executed.len() as u64);
        bump(&stats.trades_skipped, report.skipped as u64);
        bump(&stats.trades_failed, report.failed as u64);
        self.state.broadcast(&EngineEvent::CycleCompleted {
            loop_name: "executor",
            succeeded: report.executed.len() as u32,
            skipped:   report.skipped + report.not_due,
            failed:    report.failed,
        });
        Ok(report)
    }

    // ─── Execution ────────────────────────────────────────────────────────────

    /// Trade one due position. `Ok(None)` when there is nothing to sell.
    async fn execute(
        &self,
        position: &Position,
        assets: &[Asset],
        trade_id: Uuid,
    ) -> Result<Option<TradeReceipt>, AppError> {
        let input_asset = lookup(assets, position, &position.input_coin_type)?;
        let output_asset = lookup(assets, position, &position.output_coin_type)?;

        let input_amount = position.next_trade_input();
        let trade_amount = trade_out_amount(input_amount, input_asset.price_usd, output_asset.price_usd)?;
        if trade_amount == 0 {
            warn!(
                position_id  = %position.id,
                input_amount,
                input_price  = input_asset.price_usd,
                output_price = output_asset.price_usd,
                "Trade amount rounds to zero — skipping"
            );
            return Ok(None);
        }

        let config = &self.state.config;
        let coins = self.state.ledger.coins(&self.signer, &self.coin_type).await?;
        let available = coins.iter().fold(0u64, |acc, c| acc.saturating_add(c.balance));
        let native = self.coin_type == config.native_coin_type;
        let reserve = if native { config.fee_reserve } else { 0 };
        let needed = trade_amount.saturating_add(reserve);
        if available < needed {
            return Err(AppError::InsufficientBalance { needed, available });
        }

        let coin_ids: Vec<String> = coins.into_iter().map(|c| c.coin_object_id).collect();
        let payment = match (native, self.max_mode) {
            (true, true) => Payment::Gas(available - reserve),
            (true, false) => Payment::Gas(trade_amount),
            (false, true) => Payment::Coins { ids: &coin_ids, amount: CoinAmount::Max },
            (false, false) => Payment::Coins { ids: &coin_ids, amount: CoinAmount::Exact(trade_amount) },
        };
        let sold = match payment {
            Payment::Gas(amount) | Payment::Coins { amount: CoinAmount::Exact(amount), .. } => amount,
            Payment::Coins { amount: CoinAmount::Max, .. } => available,
        };

        let mut block = TransactionBlock::new(config.gas_budget);
        tx::execute_trade(&mut block, &config.package_id, &ExecuteTradeParams {
            position_id:      &position.id,
            payment,
            input_asset_id:   &input_asset.id,
            output_asset_id:  &output_asset.id,
            input_coin_type:  &position.input_coin_type,
            output_coin_type: &position.output_coin_type,
        })?;

        info!(
            position_id  = %position.id,
            trade_id     = %trade_id,
            input_amount,
            trade_amount = sold,
            "🚀 Submitting trade"
        );
        let result = self.state.ledger.submit(&self.signer, &block).await;
        self.state.store.invalidate(&position.id).await;

        let result = result?;
        if !result.success {
            return Err(AppError::TransactionSubmission(format!(
                "execute_trade {} ({}): {}",
                position.id,
                result.digest,
                result.errors.join("; ")
            )));
        }

        let explorer_url = self.state.explorer_url(&result.digest);
        info!(
            position_id  = %position.id,
            trade_id     = %trade_id,
            digest       = %result.digest,
            explorer     = %explorer_url,
            "✅ Trade executed"
        );
        self.state.broadcast(&EngineEvent::TradeExecuted {
            trade_id,
            position_id: position.id.clone(),
            owner:       position.owner.clone(),
            input_amount,
            trade_amount: sold,
            digest:      result.digest.clone(),
            explorer_url,
        });

        Ok(Some(TradeReceipt {
            trade_id,
            position_id: position.id.clone(),
            input_amount,
            trade_amount: sold,
            digest: result.digest,
        }))
    }

    // ─── Loop ─────────────────────────────────────────────────────────────────

    /// Run until the process exits.
    pub async fn run(mut self, interval: Duration) {
        info!(
            interval  = ?interval,
            coin_type = %self.coin_type,
            max_mode  = self.max_mode,
            signer    = %self.signer,
            "⚙️ Trade executor loop started"
        );
        loop {
            match self.run_cycle().await {
                Ok(report) => info!(
                    considered = report.considered,
                    executed   = report.executed.len(),
                    not_due    = report.not_due,
                    failed     = report.failed,
                    skip_set   = self.skip.len(),
                    "✅ Executor cycle complete"
                ),
                Err(e) => error!(error = %e, "❌ Executor cycle failed — will retry next interval"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}

fn lookup<'a>(assets: &'a [Asset], position: &Position, coin_type: &str) -> Result<&'a Asset, AppError> {
    find_asset(assets, coin_type).ok_or_else(|| {
        AppError::DataConsistency(format!(
            "position {} trades {coin_type}, which is not a registered asset",
            position.id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::tests::test_config;
    use crate::engine::PriceOracleUpdater;
    use crate::feed::StaticFeed;
    use crate::ledger::memory::tests::{admin_cap, asset_ids, open_position, seeded_ledger, ADMIN, PKG, SUI, USDC};
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::{
        Coin, CoinMetadata, LedgerError, LedgerEvent, LedgerGateway, LedgerObject, SharedLedger,
        SubmitResult,
    };
    use crate::models::position::tests::make_position;
    use crate::registry::tests::BlankObject;
    use crate::state::tests::local_state;
    use crate::state::AppState;

    const OPERATOR: &str = "0xoperator";

    /// Ledger with SUI/USDC at `price` each, the operator holding `usdc` USDC.
    async fn market(price: u64, usdc: u64) -> MemoryLedger {
        let ledger = seeded_ledger(price).await;
        ledger.mint(OPERATOR, USDC, usdc).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_end_to_end_single_trade_then_not_due() {
        let ledger = market(1_000_000, 10_000).await;
        let id = open_position(&ledger, "0xuser", 1000, 100, 86_400).await;
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();

        let first = scheduler.run_cycle().await.unwrap();
        assert_eq!(first.executed.len(), 1);
        assert_eq!(first.executed[0].position_id, id);
        assert_eq!(first.executed[0].trade_amount, 100);
        assert_eq!(first.executed[0].input_amount, 100);

        let position = state.store.get(&id).await.unwrap();
        assert_eq!(position.deposit, 900);
        assert_eq!(position.received, 100);
        assert!(position.last_trade_time.is_some());

        let second = scheduler.run_cycle().await.unwrap();
        assert!(second.executed.is_empty());
        assert_eq!(second.not_due, 1);
        assert_eq!(state.stats.snapshot().trades_executed, 1);
    }

    #[tokio::test]
    async fn test_trade_amount_uses_price_ratio() {
        // SUI at $2, USDC at $4: 100 SUI units buy 50 USDC units
        let state = local_state(seeded_ledger(1).await, ADMIN);
        let feed = Arc::new(StaticFeed::new([("sui", 2.0), ("usdc", 4.0)], "usdt"));
        let mut oracle = PriceOracleUpdater::new(state.clone(), feed).await.unwrap();
        assert_eq!(oracle.run_cycle().await.unwrap().updated.len(), 2);

        let local = state.local.clone().unwrap();
        let id = open_position(&local, "0xuser", 1000, 100, 60).await;
        local.mint(ADMIN, USDC, 1_000).await.unwrap();

        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].trade_amount, 50);
        assert_eq!(state.store.get(&id).await.unwrap().received, 50);
    }

    #[tokio::test]
    async fn test_final_partial_trade_then_exhausted() {
        let ledger = market(1_000_000, 10_000).await;
        let id = open_position(&ledger, "0xuser", 150, 100, 1).await;
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();

        let later = |secs: i64| Utc::now() + chrono::Duration::seconds(secs);
        assert_eq!(scheduler.run_cycle_at(later(0)).await.unwrap().executed[0].input_amount, 100);

        // the ledger enforces its own clock; wait out the 1s frequency
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let report = scheduler.run_cycle_at(later(2)).await.unwrap();
        assert_eq!(report.executed[0].input_amount, 50);
        assert_eq!(state.store.get(&id).await.unwrap().deposit, 0);

        let report = scheduler.run_cycle_at(later(10)).await.unwrap();
        assert_eq!(report.exhausted, 1);
        assert!(scheduler.skip.contains(&id));
    }

    #[tokio::test]
    async fn test_zero_deposit_never_traded() {
        let ledger = market(1_000_000, 10_000).await;
        let id = open_position(&ledger, "0xuser", 1000, 100, 60).await;
        let mut block = TransactionBlock::new(1);
        tx::withdraw_funds(&mut block, PKG, &id, SUI, USDC);
        assert!(ledger.submit("0xuser", &block).await.unwrap().success);

        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();
        for _ in 0..3 {
            let report = scheduler.run_cycle().await.unwrap();
            assert!(report.executed.is_empty());
            assert_eq!(report.failed, 0);
        }
        assert_eq!(state.stats.snapshot().trades_executed, 0);
        assert!(scheduler.skip.contains(&id));
    }

    /// Counts `get_object` reads per id.
    struct CountingLedger {
        inner: Arc<MemoryLedger>,
        reads: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LedgerGateway for CountingLedger {
        async fn get_object(&self, id: &str) -> Result<Option<LedgerObject>, LedgerError> {
            self.reads.lock().unwrap().push(id.to_string());
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
            self.inner.submit(s, tx).await
        }
    }

    #[tokio::test]
    async fn test_skip_set_avoids_reads() {
        let ledger = market(1_000_000, 10_000).await;
        let empty = open_position(&ledger, "0xuser", 1000, 100, 60).await;
        let mut block = TransactionBlock::new(1);
        tx::withdraw_funds(&mut block, PKG, &empty, SUI, USDC);
        assert!(ledger.submit("0xuser", &block).await.unwrap().success);

        let counting = Arc::new(CountingLedger {
            inner: Arc::new(ledger),
            reads: std::sync::Mutex::new(Vec::new()),
        });
        let shared: SharedLedger = counting.clone();
        let state = Arc::new(AppState::new(test_config(PKG, OPERATOR), shared, None, reqwest::Client::new()));
        let mut scheduler = TradeScheduler::new(state, USDC, false).unwrap();

        scheduler.run_cycle().await.unwrap();
        let first_reads = counting.reads.lock().unwrap().iter().filter(|id| **id == empty).count();
        assert_eq!(first_reads, 1);

        scheduler.run_cycle().await.unwrap();
        scheduler.run_cycle().await.unwrap();
        let total_reads = counting.reads.lock().unwrap().iter().filter(|id| **id == empty).count();
        assert_eq!(total_reads, 1);
    }

    #[tokio::test]
    async fn test_unregistered_asset_is_data_consistency_error() {
        let state = local_state(market(1_000_000, 10_000).await, OPERATOR);
        let scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();
        let assets = state.registry.list_assets().await.unwrap();

        let mut position = make_position(1000, 60, None);
        position.input_coin_type = "0xdead::x::X".into();
        let result = scheduler.execute(&position, &assets, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::DataConsistency(_))));
    }

    #[tokio::test]
    async fn test_insufficient_balance_fails_item_not_cycle() {
        let ledger = market(1_000_000, 150).await;
        let first = open_position(&ledger, "0xa", 1000, 100, 60).await;
        let second = open_position(&ledger, "0xb", 1000, 100, 60).await;
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].position_id, first);
        assert_eq!(report.failed, 1);
        assert_eq!(state.store.get(&second).await.unwrap().deposit, 1000);
    }

    #[tokio::test]
    async fn test_max_mode_sells_whole_balance() {
        let ledger = market(1_000_000, 300).await;
        ledger.mint(OPERATOR, USDC, 200).await.unwrap();
        let id = open_position(&ledger, "0xuser", 1000, 100, 60).await;
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, true).unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed[0].trade_amount, 500);
        assert_eq!(state.store.get(&id).await.unwrap().received, 500);
        assert!(state.ledger.coins(OPERATOR, USDC).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_native_coin_keeps_fee_reserve() {
        // position buys SUI with USDC; operator sells SUI
        let ledger = seeded_ledger(1_000_000).await;
        let usdc = ledger.mint("0xuser", USDC, 1000).await.unwrap();
        let mut block = TransactionBlock::new(1);
        tx::create_position(&mut block, PKG, &tx::CreatePositionParams {
            input_coin_type:  USDC,
            output_coin_type: SUI,
            deposit:          Payment::Coins { ids: &[usdc], amount: CoinAmount::Max },
            amount_per_trade: 100,
            frequency:        60,
        })
        .unwrap();
        assert!(ledger.submit("0xuser", &block).await.unwrap().success);

        // fee reserve defaults to 50_000_000
        ledger.mint(OPERATOR, SUI, 50_000_050).await.unwrap();
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), SUI, false).unwrap();
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.executed.is_empty());

        state.local.as_ref().unwrap().mint(OPERATOR, SUI, 50).await.unwrap();
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed.len(), 1);
        let left: u64 = state.ledger.coins(OPERATOR, SUI).await.unwrap().iter().map(|c| c.balance).sum();
        assert_eq!(left, 50_000_000);
    }

    #[tokio::test]
    async fn test_malformed_asset_does_not_stop_cycle() {
        let ledger = market(1_000_000, 10_000).await;
        let id = open_position(&ledger, "0xuser", 1000, 100, 60).await;

        let wbtc = "0xbeef::wbtc::WBTC";
        let meta = ledger.register_coin(wbtc, "WBTC", "Wrapped BTC", 8).await.unwrap();
        let mut block = TransactionBlock::new(1);
        tx::add_asset(&mut block, PKG, &tx::AddAssetParams {
            admin_cap_id:    &admin_cap(&ledger).await,
            coin_type:       wbtc,
            coin_meta_id:    &meta,
            global_table_id: &ledger.global_table_id().await,
        });
        assert!(ledger.submit(ADMIN, &block).await.unwrap().success);
        let wbtc_asset = asset_ids(&ledger)
            .await
            .into_iter()
            .find(|(_, coin_type)| coin_type == wbtc)
            .map(|(asset_id, _)| asset_id)
            .unwrap();

        let shared: SharedLedger = Arc::new(BlankObject { inner: Arc::new(ledger), target: wbtc_asset });
        let state = Arc::new(AppState::new(test_config(PKG, OPERATOR), shared, None, reqwest::Client::new()));
        let mut scheduler = TradeScheduler::new(state.clone(), USDC, false).unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].position_id, id);
    }

    #[tokio::test]
    async fn test_native_trade_uses_all_gas_coins() {
        let ledger = seeded_ledger(1_000_000).await;
        let usdc = ledger.mint("0xuser", USDC, 65_000_000).await.unwrap();
        let mut block = TransactionBlock::new(1);
        tx::create_position(&mut block, PKG, &tx::CreatePositionParams {
            input_coin_type:  USDC,
            output_coin_type: SUI,
            deposit:          Payment::Coins { ids: &[usdc], amount: CoinAmount::Max },
            amount_per_trade: 65_000_000,
            frequency:        60,
        })
        .unwrap();
        assert!(ledger.submit("0xuser", &block).await.unwrap().success);

        // neither coin alone covers the trade; together they cover it plus the reserve
        ledger.mint(OPERATOR, SUI, 60_000_000).await.unwrap();
        ledger.mint(OPERATOR, SUI, 60_000_000).await.unwrap();
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state.clone(), SUI, false).unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.executed.len(), 1);
        let left: u64 = state.ledger.coins(OPERATOR, SUI).await.unwrap().iter().map(|c| c.balance).sum();
        assert_eq!(left, 55_000_000);
    }

    #[tokio::test]
    async fn test_padded_coin_type_matches_positions() {
        let ledger = market(1_000_000, 10_000).await;
        let id = open_position(&ledger, "0xuser", 1000, 100, 60).await;
        let state = local_state(ledger, OPERATOR);
        let mut scheduler = TradeScheduler::new(state, "0x0000000000000abc::usdc::USDC", false).unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.considered, 1);
        assert_eq!(report.executed[0].position_id, id);
    }
}
