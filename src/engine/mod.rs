//! # engine
//!
//! The two operator loops:
//!
//! ```text
//!            ┌──────────────────────┐  update_price   ┌──────────┐
//!  feed ───▶ │ PriceOracleUpdater   │ ──────────────▶ │          │
//!            └──────────────────────┘                 │  ledger  │
//!            ┌──────────────────────┐  execute_trade  │ (serial- │
//!  store ──▶ │ TradeScheduler       │ ──────────────▶ │  ized)   │
//!            └──────────────────────┘                 └──────────┘
//! ```
//!
//! Each loop is one task; items inside a cycle run strictly in sequence.

pub mod oracle;
pub mod scheduler;

pub use oracle::PriceOracleUpdater;
pub use scheduler::TradeScheduler;

use crate::error::AppError;
use crate::ledger::tx::dca_type;
use crate::state::AppState;

/// Id of the first `<package>::dca::<cap>` object owned by `owner`.
pub async fn find_capability(state: &AppState, owner: &str, cap: &str) -> Result<String, AppError> {
    let struct_type = dca_type(&state.config.package_id, cap);
    state
        .ledger
        .owned_objects(owner, &struct_type)
        .await?
        .into_iter()
        .next()
        .map(|o| o.object_id)
        .ok_or_else(|| AppError::MissingCredential(format!("{owner} holds no {struct_type}")))
}
