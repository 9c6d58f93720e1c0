//! Portfolio revaluation task (spec.md §4.6, 10-minute cadence, always
//! gated). The distilled spec names the task but not its algorithm; this is
//! the natural mark-to-market reading of "portfolio revaluation" given the
//! entities in spec.md §3 — recompute each portfolio's total value (cash +
//! holdings priced at the latest cached tick) and log it, the same
//! "stateless periodic sweep, structured log line, no alert" shape the
//! rebalance scan (`planner/rebalance.rs`) uses for its own non-alerting
//! informational output.

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::market::MarketDataPort;
use crate::portfolio::PortfolioRepository;

/// Recomputes and logs `cash_balance + sum(holding.quantity * current_price)`
/// for every portfolio on record. A symbol with no current price is priced
/// at the holding's average cost rather than failing the whole sweep.
#[instrument(skip(portfolios, market))]
pub async fn run_revaluation(
    portfolios: &dyn PortfolioRepository,
    market: &dyn MarketDataPort,
) -> anyhow::Result<()> {
    let all = portfolios.list_portfolios().await?;

    for portfolio in all {
        let holdings = portfolios.holdings(portfolio.id).await?;
        if holdings.is_empty() {
            info!(
                portfolio_id = %portfolio.id,
                total_value = %portfolio.cash_balance,
                "portfolio revalued"
            );
            continue;
        }

        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let prices = match market.current_prices(&symbols).await {
            Ok(p) => p,
            Err(e) => {
                warn!(portfolio_id = %portfolio.id, error = %e, "revaluation skipped pricing, market data unavailable");
                continue;
            }
        };

        let holdings_value: Decimal = holdings
            .iter()
            .map(|h| {
                let price = prices.get(&h.symbol).map(|t| t.price).unwrap_or(h.average_cost);
                h.quantity * price
            })
            .sum();

        let total_value = portfolio.cash_balance + holdings_value;
        info!(
            portfolio_id = %portfolio.id,
            cash_balance = %portfolio.cash_balance,
            holdings_value = %holdings_value,
            total_value = %total_value,
            "portfolio revalued"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::InMemoryMarketData;
    use crate::planner::types::OrderSide;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::portfolio::{Holding, Portfolio};

    #[derive(Default)]
    struct FixturePortfolioRepository {
        portfolios: Mutex<Vec<Portfolio>>,
        holdings: Mutex<Vec<Holding>>,
    }

    #[async_trait]
    impl PortfolioRepository for FixturePortfolioRepository {
        async fn create(&self, _name: &str, _initial_cash: Decimal) -> anyhow::Result<Portfolio> {
            unreachable!()
        }
        async fn fetch(&self, portfolio_id: Uuid) -> anyhow::Result<Option<Portfolio>> {
            Ok(self
                .portfolios
                .lock()
                .iter()
                .find(|p| p.id == portfolio_id)
                .cloned())
        }
        async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>> {
            Ok(self.portfolios.lock().clone())
        }
        async fn holdings(&self, portfolio_id: Uuid) -> anyhow::Result<Vec<Holding>> {
            Ok(self
                .holdings
                .lock()
                .iter()
                .filter(|h| h.portfolio_id == portfolio_id)
                .cloned()
                .collect())
        }
        async fn set_cash_balance(&self, _portfolio_id: Uuid, _new_cash_balance: Decimal) -> anyhow::Result<()> {
            unreachable!()
        }
        async fn apply_manual_transaction(
            &self,
            _portfolio_id: Uuid,
            _symbol: &str,
            _side: OrderSide,
            _quantity: Decimal,
            _price: Decimal,
            _fees: Decimal,
        ) -> anyhow::Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn revaluation_sums_cash_and_priced_holdings() {
        let pid = Uuid::new_v4();
        let repo = FixturePortfolioRepository {
            portfolios: Mutex::new(vec![Portfolio {
                id: pid,
                name: "main".into(),
                cash_balance: dec!(1000),
                created_at: Utc::now(),
            }]),
            holdings: Mutex::new(vec![Holding {
                portfolio_id: pid,
                symbol: "ACME".into(),
                quantity: dec!(10),
                average_cost: dec!(50),
            }]),
        };
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(55), Utc::now());

        run_revaluation(&repo, &market).await.unwrap();
    }

    #[tokio::test]
    async fn revaluation_falls_back_to_average_cost_when_price_missing() {
        let pid = Uuid::new_v4();
        let repo = FixturePortfolioRepository {
            portfolios: Mutex::new(vec![Portfolio {
                id: pid,
                name: "main".into(),
                cash_balance: dec!(0),
                created_at: Utc::now(),
            }]),
            holdings: Mutex::new(vec![Holding {
                portfolio_id: pid,
                symbol: "UNKNOWN".into(),
                quantity: dec!(3),
                average_cost: dec!(20),
            }]),
        };
        let market = InMemoryMarketData::new();

        run_revaluation(&repo, &market).await.unwrap();
    }
}
