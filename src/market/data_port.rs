//! Market Data Port (spec.md §6): the external collaborator the core
//! consumes for current prices and trailing closes. Modeled the way the
//! teacher declares `SessionRepository` — a narrow `#[async_trait]` trait,
//! `Send + Sync + 'static`, with a hand-written mock for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

/// One observed price for a symbol.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceTick {
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// One trailing daily close.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Close {
    pub date: DateTime<Utc>,
    pub close: Decimal,
}

#[async_trait]
pub trait MarketDataPort: Send + Sync + 'static {
    /// Fetches current prices for a batch of symbols in one call. Symbols
    /// with no available quote are simply absent from the result (spec.md
    /// §6: "missing symbols omitted").
    async fn current_prices(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, PriceTick>>;

    /// Fetches up to `lookback_days` of trailing daily closes, oldest first.
    /// May return fewer entries than requested.
    async fn historical_closes(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> anyhow::Result<Vec<Close>>;
}

/// In-memory `MarketDataPort` used by tests and local/dev runs. Prices are
/// set explicitly by the caller (e.g. to script a price trajectory across
/// monitor ticks in scenario tests).
#[derive(Clone, Default)]
pub struct InMemoryMarketData {
    prices: Arc<RwLock<HashMap<String, PriceTick>>>,
    closes: Arc<RwLock<HashMap<String, Vec<Close>>>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal, observed_at: DateTime<Utc>) {
        self.prices
            .write()
            .insert(symbol.to_string(), PriceTick { price, observed_at });
    }

    pub fn set_closes(&self, symbol: &str, closes: Vec<Close>) {
        self.closes.write().insert(symbol.to_string(), closes);
    }
}

#[async_trait]
impl MarketDataPort for InMemoryMarketData {
    async fn current_prices(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, PriceTick>> {
        let guard = self.prices.read();
        Ok(symbols
            .iter()
            .filter_map(|s| guard.get(s).map(|t| (s.clone(), *t)))
            .collect())
    }

    async fn historical_closes(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> anyhow::Result<Vec<Close>> {
        let guard = self.closes.read();
        let all = guard.get(symbol).cloned().unwrap_or_default();
        let take = (lookback_days as usize).min(all.len());
        Ok(all[all.len() - take..].to_vec())
    }
}
