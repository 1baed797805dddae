//! # models::asset
//!
//! A registered tradable token and its oracle price.

use serde::{Deserialize, Serialize};

use crate::ledger::{field_u64, LedgerError, LedgerObject};
use crate::math::{format_fixed, USD_DECIMALS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Object id of the on-chain `Asset<T>`.
    pub id:        String,
    pub coin_type: String,
    /// Lowercase ticker the price feed is keyed by.
    pub symbol:    String,
    pub name:      String,
    pub decimals:  u32,
    /// USD price scaled by `10^6`.
    pub price_usd: u64,
}

impl Asset {
    /// Build from the `Asset<T>` object plus the coin identity found in its
    /// creation event and metadata.
    pub fn from_object(
        object: &LedgerObject,
        coin_type: String,
        symbol: &str,
        name: String,
    ) -> Result<Self, LedgerError> {
        let decimals = field_u64(&object.fields, "decimals")?;
        Ok(Self {
            id: object.object_id.clone(),
            coin_type,
            symbol: symbol.to_lowercase(),
            name,
            decimals: u32::try_from(decimals)
                .map_err(|_| LedgerError::Decode(format!("decimals out of range: {decimals}")))?,
            price_usd: field_u64(&object.fields, "price_usd")?,
        })
    }

    pub fn display_price(&self) -> String {
        format_fixed(self.price_usd, USD_DECIMALS, None)
    }
}
