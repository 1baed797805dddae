//! # registry
//!
//! **AssetRegistry**: the set of tradable assets and their on-chain prices.
//!
//! Assets are discovered through `AssetAddEvent`s, then each `Asset<T>`
//! object is read fresh for its current price. Coin metadata (symbol, name)
//! is immutable in practice and is held in a [`CoinMetadataCache`] owned by
//! the registry: a moka cache bounded in size, entries expiring after
//! `METADATA_TTL_SECS`.

use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::ledger::tx::dca_type;
use crate::ledger::{normalize_coin_type, CoinMetadata, LedgerError, SharedLedger};
use crate::models::{Asset, AssetAddEvent};

/// Upper bound on cached coin types.
pub const METADATA_CACHE_CAPACITY: u64 = 1_024;

// ─── Coin Metadata Cache ──────────────────────────────────────────────────────

pub struct CoinMetadataCache {
    entries: Cache<String, CoinMetadata>,
}

impl CoinMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(METADATA_CACHE_CAPACITY)
            .time_to_live(ttl)
            .eviction_listener(|coin_type, _meta, cause| {
                debug!(coin_type = %coin_type, ?cause, "Coin metadata evicted");
            })
            .build();
        Self { entries }
    }

    /// Cached metadata for `coin_type`, read from the ledger when absent or
    /// expired.
    pub async fn get(&self, ledger: &SharedLedger, coin_type: &str) -> Result<CoinMetadata, AppError> {
        if let Some(meta) = self.entries.get(coin_type).await {
            return Ok(meta);
        }

        let meta = ledger
            .coin_metadata(coin_type)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coin metadata for {coin_type}")))?;

        debug!(coin_type, symbol = %meta.symbol, decimals = meta.decimals, "Coin metadata cached");
        self.entries.insert(coin_type.to_string(), meta.clone()).await;
        Ok(meta)
    }

    /// Live entries, after moka's pending evictions are applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

// ─── AssetRegistry ────────────────────────────────────────────────────────────

pub struct AssetRegistry {
    ledger:     SharedLedger,
    package_id: String,
    metadata:   CoinMetadataCache,
}

impl AssetRegistry {
    pub fn new(ledger: SharedLedger, package_id: impl Into<String>, metadata_ttl: Duration) -> Self {
        Self {
            ledger,
            package_id: package_id.into(),
            metadata:   CoinMetadataCache::new(metadata_ttl),
        }
    }

    pub fn metadata(&self) -> &CoinMetadataCache {
        &self.metadata
    }

    /// Coin metadata through the registry's cache.
    pub async fn coin_metadata(&self, coin_type: &str) -> Result<CoinMetadata, AppError> {
        self.metadata.get(&self.ledger, coin_type).await
    }

    /// All registered assets with their current prices, in registration
    /// order.
    ///
    /// An asset whose event, object or metadata is missing or malformed is
    /// logged and left out; transport failures abort the listing.
    pub async fn list_assets(&self) -> Result<Vec<Asset>, AppError> {
        let events = self
            .ledger
            .query_events(&dca_type(&self.package_id, "AssetAddEvent"))
            .await?;

        let mut assets = Vec::with_capacity(events.len());
        for raw in &events {
            let event = match AssetAddEvent::from_event(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable AssetAddEvent");
                    continue;
                }
            };
            match self.load_asset(&event).await {
                Ok(asset) => assets.push(asset),
                Err(AppError::NotFound(what)) => {
                    warn!(asset_id = %event.asset_id, missing = %what, "Skipping unresolvable asset");
                }
                Err(AppError::Ledger(LedgerError::Decode(e))) => {
                    warn!(asset_id = %event.asset_id, error = %e, "Skipping undecodable asset");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(assets)
    }

    async fn load_asset(&self, event: &AssetAddEvent) -> Result<Asset, AppError> {
        let coin_type = normalize_coin_type(&event.coin_type_name);
        let object = self
            .ledger
            .get_object(&event.asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("asset object {}", event.asset_id)))?;
        let meta = self.coin_metadata(&coin_type).await?;
        Ok(Asset::from_object(&object, coin_type, &meta.symbol, event.name.clone())?)
    }

    /// The registered asset for `coin_type`.
    pub async fn get_asset(&self, coin_type: &str) -> Result<Asset, AppError> {
        let assets = self.list_assets().await?;
        find_asset(&assets, coin_type)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("asset {coin_type} is not registered")))
    }
}

/// Match on the canonical form, so `0x2::sui::SUI` and its zero-padded
/// spelling find the same asset.
pub fn find_asset<'a>(assets: &'a [Asset], coin_type: &str) -> Option<&'a Asset> {
    let wanted = normalize_coin_type(coin_type);
    assets.iter().find(|a| a.coin_type == wanted)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::ledger::memory::tests::{asset_ids, seeded_ledger, PKG, SUI, USDC};
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::{Coin, LedgerEvent, LedgerGateway, LedgerObject, SubmitResult, TransactionBlock};

    async fn registry(ledger: MemoryLedger) -> AssetRegistry {
        AssetRegistry::new(Arc::new(ledger), PKG, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_list_assets() {
        let registry = registry(seeded_ledger(2_000_000).await).await;
        let assets = registry.list_assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].coin_type, SUI);
        assert_eq!(assets[0].symbol, "sui");
        assert_eq!(assets[0].decimals, 9);
        assert_eq!(assets[1].coin_type, USDC);
        assert!(assets.iter().all(|a| a.price_usd == 2_000_000));
        assert_eq!(registry.metadata().len().await, 2);
    }

    #[tokio::test]
    async fn test_get_asset_not_found() {
        let registry = registry(seeded_ledger(1_000_000).await).await;
        assert_eq!(registry.get_asset(USDC).await.unwrap().decimals, 6);
        assert!(matches!(
            registry.get_asset("0xdead::x::X").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_expires() {
        let ledger: SharedLedger = Arc::new(seeded_ledger(1_000_000).await);
        let cache = CoinMetadataCache::new(Duration::from_millis(50));
        cache.get(&ledger, SUI).await.unwrap();
        assert!(cache.entries.contains_key(SUI));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.entries.get(SUI).await.is_none());
        assert_eq!(cache.len().await, 0);
        assert!(matches!(cache.get(&ledger, "0xdead::x::X").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_metadata_capacity_is_bounded() {
        let ledger = seeded_ledger(1_000_000).await;
        for i in 0..(METADATA_CACHE_CAPACITY + 50) {
            ledger.register_coin(&format!("0x{i:x}::t::T"), "t", "T", 6).await.unwrap();
        }
        let ledger: SharedLedger = Arc::new(ledger);
        let cache = CoinMetadataCache::new(Duration::from_secs(300));
        for i in 0..(METADATA_CACHE_CAPACITY + 50) {
            cache.get(&ledger, &format!("0x{i:x}::t::T")).await.unwrap();
        }
        assert!(cache.len().await <= METADATA_CACHE_CAPACITY);
    }

    /// Wraps a ledger and blanks the fields of one object.
    pub(crate) struct BlankObject {
        pub(crate) inner:  SharedLedger,
        pub(crate) target: String,
    }

    #[async_trait]
    impl LedgerGateway for BlankObject {
        async fn get_object(&self, id: &str) -> Result<Option<LedgerObject>, LedgerError> {
            let object = self.inner.get_object(id).await?;
            Ok(object.map(|mut o| {
                if o.object_id == self.target {
                    o.fields = serde_json::json!({});
                }
                o
            }))
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
    async fn test_malformed_asset_is_skipped() {
        let ledger = seeded_ledger(1_000_000).await;
        let sui_asset = asset_ids(&ledger)
            .await
            .into_iter()
            .find(|(_, coin_type)| coin_type == SUI)
            .map(|(id, _)| id)
            .unwrap();
        let shared: SharedLedger = Arc::new(BlankObject { inner: Arc::new(ledger), target: sui_asset });
        let registry = AssetRegistry::new(shared, PKG, Duration::from_secs(300));

        let assets = registry.list_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].coin_type, USDC);
    }
}
