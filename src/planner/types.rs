//! Grid/Order/StrategyConfig domain types (spec.md §3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::Market;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

/// Polymorphic strategy config, modeled as a tagged variant per spec.md §9's
/// redesign note ("avoid dispatch through class hierarchies").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    Static,
    Dynamic {
        /// Annualised volatility used to derive bounds, either estimated
        /// from trailing closes or the 0.20 fallback (spec.md §4.2 step 4).
        volatility: Decimal,
        multiplier: Decimal,
        center_price: Decimal,
        lookback_days: u32,
    },
}

impl StrategyConfig {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, StrategyConfig::Dynamic { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Grid {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub level_count: u32,
    pub investment_amount: Decimal,
    pub status: GridStatus,
    pub strategy_config: StrategyConfig,
    pub created_at: DateTime<Utc>,
    pub last_rebalanced_at: Option<DateTime<Utc>>,
    pub market: Market,
}

impl Grid {
    /// `spacing = (upper - lower) / level_count` (spec.md §3).
    pub fn spacing(&self) -> Decimal {
        (self.upper_price - self.lower_price) / Decimal::from(self.level_count)
    }

    /// Price of the i-th level under the fixed, upper-exclusive ladder
    /// convention resolved in DESIGN.md (Open Question #1): level 0 sits at
    /// `lower_price` and is orderable; `level_count` interior levels are
    /// enumerated at `lower + i*spacing` for `i in 0..level_count`, and
    /// `upper_price` itself is the boundary, never an orderable level.
    pub fn level_price(&self, level_index: u32) -> Decimal {
        self.lower_price + Decimal::from(level_index) * self.spacing()
    }

    /// The price of the level immediately above `level_index`, or `None` if
    /// that would land at or beyond `upper_price` (over-boundary).
    pub fn next_level_price(&self, level_index: u32) -> Option<Decimal> {
        let next = self.level_price(level_index) + self.spacing();
        if next >= self.upper_price {
            None
        } else {
            Some(next)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Filled,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CancelReason {
    InsufficientCash,
    InsufficientHolding,
    GridCancelled,
    Rebalanced,
}

#[derive(Clone, Debug)]
pub struct Order {
    pub id: Uuid,
    pub grid_id: Uuid,
    pub level_index: u32,
    pub level_price: Decimal,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub state: OrderState,
    pub paired_level: Option<u32>,
    pub filled_at: Option<DateTime<Utc>>,
    pub filled_price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub realised_profit: Option<Decimal>,
    pub cancel_reason: Option<CancelReason>,
}

impl Order {
    pub fn new_pending(
        grid_id: Uuid,
        level_index: u32,
        level_price: Decimal,
        side: OrderSide,
        quantity: Decimal,
        paired_level: Option<u32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid_id,
            level_index,
            level_price,
            side,
            quantity,
            state: OrderState::Pending,
            paired_level,
            filled_at: None,
            filled_price: None,
            trigger_price: None,
            realised_profit: None,
            cancel_reason: None,
        }
    }

    /// BUY trigger: `observed_price <= level_price` (inclusive, spec.md §8).
    /// SELL trigger: `observed_price >= level_price` (inclusive, spec.md §8).
    pub fn triggers_at(&self, observed_price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => observed_price <= self.level_price,
            OrderSide::Sell => observed_price >= self.level_price,
        }
    }
}
