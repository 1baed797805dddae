//! # feed — External USD price feed
//!
//! ## Sources
//! 1. CoinGecko-compatible `simple/price` API (default)
//! 2. Static table: `PRICE_FEED_URL=static:sui=1.25,usdc=1` for local runs
//!    and tests, no network at all
//!
//! Prices are keyed by lowercase symbol. The configured stablecoin is pinned
//! to exactly `1.0` and never looked up.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::AppError;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current USD price of `symbol` (lowercase).
    async fn get_price(&self, symbol: &str) -> Result<f64, AppError>;
}

pub type SharedFeed = std::sync::Arc<dyn PriceFeed>;

// ─── CoinGecko ────────────────────────────────────────────────────────────────

pub struct CoinGeckoFeed {
    client:     reqwest::Client,
    base_url:   String,
    stablecoin: String,
}

impl CoinGeckoFeed {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, stablecoin: &str) -> Self {
        Self {
            client,
            base_url:   base_url.into().trim_end_matches('/').to_string(),
            stablecoin: stablecoin.to_lowercase(),
        }
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn get_price(&self, symbol: &str) -> Result<f64, AppError> {
        let symbol = symbol.to_lowercase();
        if symbol == self.stablecoin {
            return Ok(1.0);
        }

        let url = format!("{}/simple/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("ids", symbol.as_str()), ("vs_currencies", "usd")])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AppError::NotFound(format!("price feed unreachable for {symbol}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AppError::NotFound(format!("price feed HTTP {status} for {symbol}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::NotFound(format!("unreadable price for {symbol}: {e}")))?;

        let price = extract_usd(&body, &symbol)?;
        debug!(symbol = %symbol, price, "Feed price");
        Ok(price)
    }
}

/// `{"sui": {"usd": 1.23}}` → `1.23`
fn extract_usd(body: &serde_json::Value, symbol: &str) -> Result<f64, AppError> {
    body.get(symbol)
        .and_then(|entry| entry.get("usd"))
        .and_then(|usd| usd.as_f64())
        .ok_or_else(|| AppError::NotFound(format!("no USD price for {symbol}")))
}

// ─── Static ───────────────────────────────────────────────────────────────────

pub struct StaticFeed {
    prices:     HashMap<String, f64>,
    stablecoin: String,
}

impl StaticFeed {
    pub fn new<I, S>(prices: I, stablecoin: &str) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self {
            prices:     prices.into_iter().map(|(s, p)| (s.as_ref().to_lowercase(), p)).collect(),
            stablecoin: stablecoin.to_lowercase(),
        }
    }

    /// Parse `sui=1.25,usdc=1`.
    pub fn parse(table: &str, stablecoin: &str) -> Result<Self, AppError> {
        let mut prices = Vec::new();
        for pair in table.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (symbol, price) = pair
                .split_once('=')
                .ok_or_else(|| AppError::Validation(format!("expected symbol=price, got '{pair}'")))?;
            let price: f64 = price
                .trim()
                .parse()
                .map_err(|_| AppError::InvalidPrice(format!("'{price}' for {symbol}")))?;
            prices.push((symbol.trim().to_string(), price));
        }
        Ok(Self::new(prices, stablecoin))
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    async fn get_price(&self, symbol: &str) -> Result<f64, AppError> {
        let symbol = symbol.to_lowercase();
        if symbol == self.stablecoin {
            return Ok(1.0);
        }
        self.prices
            .get(&symbol)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("no USD price for {symbol}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_usd() {
        let body = json!({ "sui": { "usd": 1.23 } });
        assert_eq!(extract_usd(&body, "sui").unwrap(), 1.23);
        assert!(extract_usd(&json!({}), "sui").is_err());
    }

    #[tokio::test]
    async fn test_stablecoin_is_pinned_without_network() {
        // unroutable base url: a lookup would fail
        let feed = CoinGeckoFeed::new(reqwest::Client::new(), "http://127.0.0.1:9", "USDC");
        assert_eq!(feed.get_price("usdc").await.unwrap(), 1.0);
        assert_eq!(feed.get_price("USDC").await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_static_feed() {
        let feed = StaticFeed::parse("sui=1.25, weth = 3000", "usdc").unwrap();
        assert_eq!(feed.get_price("SUI").await.unwrap(), 1.25);
        assert_eq!(feed.get_price("usdc").await.unwrap(), 1.0);
        assert!(matches!(feed.get_price("btc").await, Err(AppError::NotFound(_))));
        assert!(StaticFeed::parse("sui:1", "usdc").is_err());
    }
}
