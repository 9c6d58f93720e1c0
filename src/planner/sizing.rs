//! Grid Planner (spec.md §4.2): validates inputs, resolves a current price,
//! computes the ladder, and produces the initial order set. Grounded on
//! `planner/sizing.rs`'s `derive_execution_plan` shape — a pure function
//! taking a policy + inputs and returning typed outputs, unit-tested with
//! table-style cases — generalized from "chunk a bid" to "lay out a ladder
//! of BUY/SELL levels."

use rust_decimal::Decimal;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::PlannerError;
use crate::market::{Market, MarketDataPort};
use crate::planner::dynamic::{self, DynamicBounds};
use crate::planner::types::{Grid, GridStatus, Order, OrderSide, StrategyConfig};

const MIN_LEVEL_COUNT: u32 = 2;
const MAX_LEVEL_COUNT: u32 = 200;

/// Caller-supplied bounds request: either fixed (STATIC) or derived from
/// volatility (DYNAMIC).
#[derive(Clone, Debug)]
pub enum BoundsRequest {
    Static { lower: Decimal, upper: Decimal },
    Dynamic {
        multiplier: Decimal,
        lookback_days: u32,
        allow_fallback: bool,
    },
}

#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub level_count: u32,
    pub investment_amount: Decimal,
    pub bounds: BoundsRequest,
}

/// Validates the inputs common to both STATIC and DYNAMIC requests
/// (spec.md §4.2 step 1).
fn validate_common(req: &PlanRequest) -> Result<(), PlannerError> {
    if !(MIN_LEVEL_COUNT..=MAX_LEVEL_COUNT).contains(&req.level_count) {
        return Err(PlannerError::InvalidLevels(req.level_count));
    }
    if req.investment_amount <= Decimal::ZERO {
        return Err(PlannerError::InvalidCapital(req.investment_amount.to_string()));
    }
    Ok(())
}

fn validate_bounds(lower: Decimal, upper: Decimal) -> Result<(), PlannerError> {
    if lower <= Decimal::ZERO || upper <= lower {
        return Err(PlannerError::InvalidBounds {
            lower: lower.to_string(),
            upper: upper.to_string(),
        });
    }
    Ok(())
}

/// Resolves final `(lower, upper)` bounds and the strategy config to persist,
/// handling the DYNAMIC volatility estimation path (spec.md §4.2 step 4).
async fn resolve_bounds(
    market: &dyn MarketDataPort,
    symbol: &str,
    p_now: Decimal,
    req: &BoundsRequest,
) -> Result<(Decimal, Decimal, StrategyConfig), PlannerError> {
    match req {
        BoundsRequest::Static { lower, upper } => {
            validate_bounds(*lower, *upper)?;
            Ok((*lower, *upper, StrategyConfig::Static))
        }
        BoundsRequest::Dynamic {
            multiplier,
            lookback_days,
            allow_fallback,
        } => {
            let closes = market
                .historical_closes(symbol, *lookback_days)
                .await
                .map_err(|_| PlannerError::InsufficientHistory {
                    symbol: symbol.to_string(),
                    have: 0,
                    want: *lookback_days as usize,
                })?;

            let have = closes.len();
            let DynamicBounds {
                lower,
                upper,
                volatility,
                used_fallback,
            } = dynamic::compute_bounds(p_now, *multiplier, &closes, *allow_fallback).map_err(
                |_| PlannerError::InsufficientHistory {
                    symbol: symbol.to_string(),
                    have,
                    want: *lookback_days as usize,
                },
            )?;

            if used_fallback {
                debug!(symbol, "dynamic grid using fallback volatility 0.20");
            }

            validate_bounds(lower, upper)?;

            Ok((
                lower,
                upper,
                StrategyConfig::Dynamic {
                    volatility,
                    multiplier: *multiplier,
                    center_price: p_now,
                    lookback_days: *lookback_days,
                },
            ))
        }
    }
}

/// Produces the initial ladder of orders given the resolved grid and current
/// price, branching on the market's short-sale permission (spec.md §4.2 step
/// 3, §8 invariant 3).
pub(crate) fn build_initial_orders(grid: &Grid, p_now: Decimal) -> Vec<Order> {
    let allows_short = grid.market.allows_short();

    let buy_levels: Vec<u32> = (0..grid.level_count)
        .filter(|&i| grid.level_price(i) < p_now)
        .collect();

    if allows_short {
        // The level priced exactly at `p_now` is a SELL, not an orphan: BUYs
        // sit strictly below the current price, SELLs sit at-or-above it
        // (spec.md §8 S1: p_now=100 over 90..110/10 levels places SELL@100).
        let sell_levels: Vec<u32> = (0..grid.level_count)
            .filter(|&i| grid.level_price(i) >= p_now)
            .collect();

        let capital_per_level = grid.investment_amount / Decimal::from(grid.level_count);

        let mut orders = Vec::with_capacity(buy_levels.len() + sell_levels.len());
        for i in buy_levels {
            let level_price = grid.level_price(i);
            let qty = capital_per_level / level_price;
            orders.push(Order::new_pending(
                grid.id,
                i,
                level_price,
                OrderSide::Buy,
                qty,
                None,
            ));
        }
        for i in sell_levels {
            let level_price = grid.level_price(i);
            let qty = capital_per_level / level_price;
            orders.push(Order::new_pending(
                grid.id,
                i,
                level_price,
                OrderSide::Sell,
                qty,
                None,
            ));
        }
        orders
    } else {
        // China/HK: BUY-only ladder. No SELL orders exist until a paired BUY
        // fills (spec.md §4.2 step 3, §8 invariant 3).
        if buy_levels.is_empty() {
            return vec![];
        }
        let capital_per_buy_level =
            grid.investment_amount / Decimal::from(buy_levels.len() as u64);

        buy_levels
            .into_iter()
            .map(|i| {
                let level_price = grid.level_price(i);
                let qty = capital_per_buy_level / level_price;
                Order::new_pending(grid.id, i, level_price, OrderSide::Buy, qty, None)
            })
            .collect()
    }
}

/// Validates, resolves bounds/strategy, and produces a `Grid` plus its
/// initial order set. Performs no I/O beyond the `MarketDataPort` calls
/// needed to resolve `p_now` and (for DYNAMIC grids) trailing closes; never
/// persists anything — persistence and the `GRID_CREATED` alert are the
/// caller's responsibility (spec.md §4.2 step 5), kept out of this pure
/// planning function the same way the teacher keeps `derive_execution_plan`
/// free of repository/alert side effects.
#[instrument(skip(market, req), fields(symbol = %req.symbol, level_count = req.level_count))]
pub async fn plan_grid(
    market: &dyn MarketDataPort,
    req: PlanRequest,
) -> Result<(Grid, Vec<Order>), PlannerError> {
    validate_common(&req)?;

    let prices = market
        .current_prices(&[req.symbol.clone()])
        .await
        .map_err(|_| PlannerError::SymbolUnresolved(req.symbol.clone()))?;

    let p_now = prices
        .get(&req.symbol)
        .ok_or_else(|| PlannerError::SymbolUnresolved(req.symbol.clone()))?
        .price;

    let (lower, upper, strategy_config) =
        resolve_bounds(market, &req.symbol, p_now, &req.bounds).await?;

    let grid = Grid {
        id: Uuid::new_v4(),
        portfolio_id: req.portfolio_id,
        symbol: req.symbol.clone(),
        name: req.name,
        lower_price: lower,
        upper_price: upper,
        level_count: req.level_count,
        investment_amount: req.investment_amount,
        status: GridStatus::Active,
        strategy_config,
        created_at: chrono::Utc::now(),
        last_rebalanced_at: None,
        market: Market::classify(&req.symbol),
    };

    let orders = build_initial_orders(&grid, p_now);

    debug!(order_count = orders.len(), "grid plan produced");

    Ok((grid, orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::InMemoryMarketData;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn req(symbol: &str, lower: Decimal, upper: Decimal, level_count: u32, amount: Decimal) -> PlanRequest {
        PlanRequest {
            portfolio_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            name: "test grid".into(),
            level_count,
            investment_amount: amount,
            bounds: BoundsRequest::Static { lower, upper },
        }
    }

    #[tokio::test]
    async fn s1_us_static_grid_basic_ladder() {
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(100), Utc::now());

        let (grid, orders) = plan_grid(
            &market,
            req("ACME", dec!(90), dec!(110), 10, dec!(10000)),
        )
        .await
        .unwrap();

        assert_eq!(grid.spacing(), dec!(2));

        let buys: Vec<Decimal> = orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .map(|o| o.level_price)
            .collect();
        let sells: Vec<Decimal> = orders
            .iter()
            .filter(|o| o.side == OrderSide::Sell)
            .map(|o| o.level_price)
            .collect();

        let mut buys_sorted = buys.clone();
        buys_sorted.sort();
        let mut sells_sorted = sells.clone();
        sells_sorted.sort();

        assert_eq!(
            buys_sorted,
            vec![dec!(90), dec!(92), dec!(94), dec!(96), dec!(98)]
        );
        assert_eq!(
            sells_sorted,
            vec![dec!(100), dec!(102), dec!(104), dec!(106), dec!(108)]
        );
    }

    #[tokio::test]
    async fn s2_china_no_short_grid_has_buy_only_ladder() {
        let market = InMemoryMarketData::new();
        market.set_price("600298.SS", dec!(40), Utc::now());

        let (grid, orders) = plan_grid(
            &market,
            req("600298.SS", dec!(36), dec!(44), 8, dec!(800000)),
        )
        .await
        .unwrap();

        assert!(!grid.market.allows_short());
        assert!(orders.iter().all(|o| o.side == OrderSide::Buy));

        let mut prices: Vec<Decimal> = orders.iter().map(|o| o.level_price).collect();
        prices.sort();
        assert_eq!(prices, vec![dec!(36), dec!(37), dec!(38), dec!(39)]);

        // capital_per_buy_level = 800000 / 4 = 200000
        for o in &orders {
            let expected_qty = dec!(200000) / o.level_price;
            assert_eq!(o.quantity, expected_qty);
        }
    }

    #[tokio::test]
    async fn invalid_bounds_rejected() {
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(100), Utc::now());

        let err = plan_grid(&market, req("ACME", dec!(100), dec!(90), 10, dec!(10000)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidBounds { .. }));
    }

    #[tokio::test]
    async fn invalid_level_count_rejected() {
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(100), Utc::now());

        let err = plan_grid(&market, req("ACME", dec!(90), dec!(110), 1, dec!(10000)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidLevels(1)));

        let err = plan_grid(&market, req("ACME", dec!(90), dec!(110), 201, dec!(10000)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidLevels(201)));
    }

    #[tokio::test]
    async fn invalid_capital_rejected() {
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(100), Utc::now());

        let err = plan_grid(&market, req("ACME", dec!(90), dec!(110), 10, dec!(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidCapital(_)));
    }

    #[tokio::test]
    async fn unresolved_symbol_rejected() {
        let market = InMemoryMarketData::new();
        let err = plan_grid(&market, req("NOPE", dec!(90), dec!(110), 10, dec!(10000)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::SymbolUnresolved(_)));
    }

    #[tokio::test]
    async fn dynamic_grid_falls_back_when_history_missing() {
        let market = InMemoryMarketData::new();
        market.set_price("ACME", dec!(100), Utc::now());

        let req = PlanRequest {
            portfolio_id: Uuid::new_v4(),
            symbol: "ACME".into(),
            name: "dynamic".into(),
            level_count: 10,
            investment_amount: dec!(10000),
            bounds: BoundsRequest::Dynamic {
                multiplier: dec!(2),
                lookback_days: 30,
                allow_fallback: true,
            },
        };

        let (grid, _orders) = plan_grid(&market, req).await.unwrap();
        match grid.strategy_config {
            StrategyConfig::Dynamic {
                volatility,
                center_price,
                ..
            } => {
                assert_eq!(volatility, dynamic::FALLBACK_VOLATILITY);
                assert_eq!(center_price, dec!(100));
            }
            _ => panic!("expected dynamic strategy"),
        }
    }
}
