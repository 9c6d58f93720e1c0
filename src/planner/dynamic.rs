//! DYNAMIC strategy bounds derivation and rebalance-trigger evaluation
//! (spec.md §4.2 step 4, §4.4 step 4, §9 "Polymorphic strategy" redesign
//! note).
//!
//! Modeled as free functions over a tagged variant rather than dispatch
//! through a trait object hierarchy, per the redesign note: `initial_bounds`
//! and `should_rebalance` are the two operations a STATIC/DYNAMIC strategy
//! must support, and STATIC trivially satisfies both (fixed bounds, never
//! rebalances).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::market::Close;
use crate::planner::types::{Grid, StrategyConfig};

/// Fallback annualised volatility used when trailing history is too thin to
/// estimate one (spec.md §4.2 step 4: "fall back to σ = 0.20").
pub const FALLBACK_VOLATILITY: Decimal = dec!(0.20);

/// Trading days per year used to annualise daily volatility (√252).
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub struct DynamicBounds {
    pub lower: Decimal,
    pub upper: Decimal,
    pub volatility: Decimal,
    pub used_fallback: bool,
}

/// Estimates annualised volatility from trailing daily closes via the
/// standard deviation of daily simple returns, scaled by √252.
///
/// Returns `None` if fewer than 2 closes are available (not enough to form
/// even one return), signalling the caller should use the fallback.
pub fn estimate_annualised_volatility(closes: &[Close]) -> Option<Decimal> {
    if closes.len() < 2 {
        return None;
    }

    let mut returns: Vec<f64> = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        let prev = w[0].close.to_f64().unwrap_or(0.0);
        let cur = w[1].close.to_f64().unwrap_or(0.0);
        if prev > 0.0 {
            returns.push((cur - prev) / prev);
        }
    }

    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let daily_vol = variance.sqrt();
    let annualised = daily_vol * TRADING_DAYS_PER_YEAR.sqrt();

    Decimal::from_f64_retain(annualised)
}

/// Computes `lower`/`upper` bounds for a DYNAMIC grid from
/// `p_now ± k * σ_annualised * p_now` (spec.md §4.2 step 4).
///
/// `allow_fallback = false` makes an insufficient-history condition fatal
/// (`PlannerError::InsufficientHistory`, surfaced by the caller) instead of
/// silently substituting the 0.20 default — configurable per spec.md §4.2's
/// error note ("only fatal for DYNAMIC if even the fallback is disabled by
/// config").
pub fn compute_bounds(
    p_now: Decimal,
    multiplier: Decimal,
    closes: &[Close],
    allow_fallback: bool,
) -> Result<DynamicBounds, ()> {
    let (volatility, used_fallback) = match estimate_annualised_volatility(closes) {
        Some(v) => (v, false),
        None => {
            if !allow_fallback {
                return Err(());
            }
            (FALLBACK_VOLATILITY, true)
        }
    };

    let offset = p_now * multiplier * volatility;
    Ok(DynamicBounds {
        lower: p_now - offset,
        upper: p_now + offset,
        volatility,
        used_fallback,
    })
}

/// Whether a DYNAMIC grid should enqueue a `REBALANCE_SUGGESTED` alert: drift
/// of the current price away from `center_price` exceeding
/// `rebalance_threshold * (upper - lower)` (spec.md §4.4 step 4, default
/// threshold 0.4).
pub fn should_rebalance(grid: &Grid, current_price: Decimal, threshold_fraction: Decimal) -> bool {
    let StrategyConfig::Dynamic { center_price, .. } = &grid.strategy_config else {
        return false;
    };

    let width = grid.upper_price - grid.lower_price;
    if width <= Decimal::ZERO {
        return false;
    }

    let drift = (current_price - *center_price).abs();
    drift > threshold_fraction * width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Market;
    use chrono::Utc;
    use uuid::Uuid;

    fn closes_with(prices: &[&str]) -> Vec<Close> {
        prices
            .iter()
            .map(|p| Close {
                date: Utc::now(),
                close: p.parse().unwrap(),
            })
            .collect()
    }

    #[test]
    fn insufficient_history_returns_none() {
        assert!(estimate_annualised_volatility(&[]).is_none());
        assert!(estimate_annualised_volatility(&closes_with(&["100"])).is_none());
    }

    #[test]
    fn sufficient_history_estimates_positive_volatility() {
        let closes = closes_with(&["100", "101", "99", "102", "98", "103"]);
        let vol = estimate_annualised_volatility(&closes).unwrap();
        assert!(vol > Decimal::ZERO);
    }

    #[test]
    fn compute_bounds_falls_back_when_history_too_thin() {
        let out = compute_bounds(dec!(100), dec!(2), &[], true).unwrap();
        assert!(out.used_fallback);
        assert_eq!(out.volatility, FALLBACK_VOLATILITY);
        // offset = 100 * 2 * 0.20 = 40
        assert_eq!(out.lower, dec!(60));
        assert_eq!(out.upper, dec!(140));
    }

    #[test]
    fn compute_bounds_errors_when_fallback_disabled_and_history_thin() {
        let out = compute_bounds(dec!(100), dec!(2), &[], false);
        assert!(out.is_err());
    }

    fn dynamic_grid(center: Decimal, lower: Decimal, upper: Decimal) -> Grid {
        Grid {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: "ACME".into(),
            name: "dyn".into(),
            lower_price: lower,
            upper_price: upper,
            level_count: 10,
            investment_amount: dec!(10000),
            status: crate::planner::types::GridStatus::Active,
            strategy_config: StrategyConfig::Dynamic {
                volatility: dec!(0.2),
                multiplier: dec!(2),
                center_price: center,
                lookback_days: 30,
            },
            created_at: Utc::now(),
            last_rebalanced_at: None,
            market: Market::Us,
        }
    }

    #[test]
    fn rebalance_triggers_on_s6_scenario() {
        // center=100, bounds 80..120 (width 40), threshold 0.4 -> trigger at
        // drift > 16, i.e. price beyond 116 or below 84. Price reaches 119.
        let g = dynamic_grid(dec!(100), dec!(80), dec!(120));
        assert!(should_rebalance(&g, dec!(119), dec!(0.4)));
    }

    #[test]
    fn rebalance_does_not_trigger_within_threshold() {
        let g = dynamic_grid(dec!(100), dec!(80), dec!(120));
        assert!(!should_rebalance(&g, dec!(110), dec!(0.4)));
    }

    #[test]
    fn static_grid_never_rebalances() {
        let mut g = dynamic_grid(dec!(100), dec!(80), dec!(120));
        g.strategy_config = StrategyConfig::Static;
        assert!(!should_rebalance(&g, dec!(200), dec!(0.4)));
    }
}
