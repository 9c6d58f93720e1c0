//! Read-mostly price cache, grounded on the teacher's `MarketViewStore`
//! (`market_view/mod.rs`): last-write-wins, monotonic per symbol, updated
//! only by the price-cache task (spec.md §5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug)]
pub struct CachedPrice {
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Shared, read-mostly store of the latest observed price per symbol.
#[derive(Clone, Default)]
pub struct PriceCache {
    inner: Arc<RwLock<HashMap<String, CachedPrice>>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the cached price for `symbol`, enforcing monotonicity: a tick
    /// older than or equal to the cached one is dropped rather than applied
    /// (spec.md §3: "`observed_at` monotonic per symbol").
    pub async fn set(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get(symbol) {
            if observed_at <= existing.observed_at {
                return;
            }
        }
        guard.insert(symbol.to_string(), CachedPrice { price, observed_at });
    }

    pub async fn get(&self, symbol: &str) -> Option<CachedPrice> {
        self.inner.read().await.get(symbol).copied()
    }

    pub async fn get_many(&self, symbols: &[String]) -> HashMap<String, CachedPrice> {
        let guard = self.inner.read().await;
        symbols
            .iter()
            .filter_map(|s| guard.get(s).map(|p| (s.clone(), *p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn stale_tick_is_dropped() {
        let cache = PriceCache::new();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        cache.set("AAA", dec!(100), t1).await;
        cache.set("AAA", dec!(50), t0).await;

        let got = cache.get("AAA").await.unwrap();
        assert_eq!(got.price, dec!(100));
    }

    #[tokio::test]
    async fn newer_tick_overwrites() {
        let cache = PriceCache::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        cache.set("AAA", dec!(100), t0).await;
        cache.set("AAA", dec!(120), t1).await;

        let got = cache.get("AAA").await.unwrap();
        assert_eq!(got.price, dec!(120));
    }
}
