//! # events
//!
//! [`EngineEvent`]: everything the oracle and executor loops publish to the
//! `/ws/monitor` stream.
//!
//! Sent over `tokio::sync::broadcast::Sender<String>` as pre-serialized JSON.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// Oracle committed a new on-chain price.
    PriceUpdated {
        coin_type: String,
        symbol:    String,
        /// 6-decimal fixed-point USD
        price_usd: u64,
        digest:    String,
    },

    /// Asset left at its previous price this cycle.
    PriceSkipped {
        coin_type: String,
        symbol:    String,
        reason:    String,
    },

    TradeExecuted {
        trade_id:     Uuid,
        position_id:  String,
        owner:        String,
        input_amount: u64,
        trade_amount: u64,
        digest:       String,
        explorer_url: String,
    },

    TradeFailed {
        trade_id:    Uuid,
        position_id: String,
        reason:      String,
    },

    /// One loop finished a pass. `loop_name` is `"oracle"` or `"executor"`.
    CycleCompleted {
        loop_name: &'static str,
        succeeded: u32,
        skipped:   u32,
        failed:    u32,
    },
}

impl EngineEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
