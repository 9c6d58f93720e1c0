//! Alert domain types (spec.md §4.5). Eleven kinds, exhaustively, each with
//! its own dedup bucket formula (`hash(kind, grid_id, bucket(param, grain))`)
//! rather than one flat struct with an optional-field-per-kind grab bag, per
//! spec.md §9's redesign note on tagged variants over class hierarchies.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::planner::types::OrderSide;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Every event the core can surface to an operator (spec.md §4.5: "Alert
/// kinds (exhaustive)").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    GridCreated {
        grid_id: Uuid,
        symbol: String,
    },
    OrderFilled {
        grid_id: Uuid,
        order_id: Uuid,
        level_index: u32,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    },
    ProfitMilestone {
        grid_id: Uuid,
        cumulative_profit: Decimal,
        milestone_index: usize,
    },
    PriceNearBoundary {
        grid_id: Uuid,
        symbol: String,
        price: Decimal,
        boundary_buffer: Decimal,
    },
    PriceAboveRange {
        grid_id: Uuid,
        symbol: String,
        price: Decimal,
        boundary_buffer: Decimal,
    },
    PriceBelowRange {
        grid_id: Uuid,
        symbol: String,
        price: Decimal,
        boundary_buffer: Decimal,
    },
    RebalanceSuggested {
        grid_id: Uuid,
        symbol: String,
        current_price: Decimal,
        center_price: Decimal,
    },
    MarketDataGap {
        symbol: String,
    },
    InsufficientCash {
        grid_id: Uuid,
        order_id: Uuid,
    },
    InsufficientHolding {
        grid_id: Uuid,
        order_id: Uuid,
    },
    GridCompleted {
        grid_id: Uuid,
    },
}

impl AlertKind {
    /// spec.md §4.4/§4.5 assign WARN to the boundary-breach and data-gap
    /// kinds and INFO to everything else; no kind in the exhaustive list is
    /// CRITICAL by default (that tier exists for the dedup-bypass policy,
    /// not as a default assignment — see `AlertSink::raise`).
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::GridCreated { .. }
            | AlertKind::OrderFilled { .. }
            | AlertKind::ProfitMilestone { .. }
            | AlertKind::PriceNearBoundary { .. }
            | AlertKind::RebalanceSuggested { .. }
            | AlertKind::GridCompleted { .. } => AlertSeverity::Info,
            AlertKind::InsufficientCash { .. }
            | AlertKind::InsufficientHolding { .. }
            | AlertKind::PriceAboveRange { .. }
            | AlertKind::PriceBelowRange { .. }
            | AlertKind::MarketDataGap { .. } => AlertSeverity::Warning,
        }
    }

    /// Stable key used for dedup (spec.md §4.5): `hash(kind, grid_id,
    /// bucket(param, grain))`, collapsed here to a plain string since string
    /// equality already gives us the hash-bucket-collision semantics we
    /// need.
    pub fn dedup_key(&self) -> String {
        match self {
            AlertKind::GridCreated { grid_id, .. } => format!("grid_created:{grid_id}"),
            AlertKind::OrderFilled {
                grid_id,
                level_index,
                ..
            } => format!("order_filled:{grid_id}:{level_index}"),
            AlertKind::ProfitMilestone {
                grid_id,
                milestone_index,
                ..
            } => format!("profit_milestone:{grid_id}:{milestone_index}"),
            AlertKind::PriceNearBoundary {
                grid_id,
                price,
                boundary_buffer,
                ..
            } => format!(
                "near_boundary:{grid_id}:{}",
                price_bucket(*price, *boundary_buffer)
            ),
            AlertKind::PriceAboveRange {
                grid_id,
                price,
                boundary_buffer,
                ..
            } => format!(
                "above_range:{grid_id}:{}",
                price_bucket(*price, *boundary_buffer)
            ),
            AlertKind::PriceBelowRange {
                grid_id,
                price,
                boundary_buffer,
                ..
            } => format!(
                "below_range:{grid_id}:{}",
                price_bucket(*price, *boundary_buffer)
            ),
            AlertKind::RebalanceSuggested { grid_id, .. } => format!("rebalance:{grid_id}"),
            AlertKind::MarketDataGap { symbol } => format!("market_data_gap:{symbol}"),
            AlertKind::InsufficientCash { grid_id, order_id } => {
                format!("insufficient_cash:{grid_id}:{order_id}")
            }
            AlertKind::InsufficientHolding { grid_id, order_id } => {
                format!("insufficient_holding:{grid_id}:{order_id}")
            }
            AlertKind::GridCompleted { grid_id } => format!("grid_completed:{grid_id}"),
        }
    }

    /// Per-kind override of the default dedup window (spec.md §4.5:
    /// `MARKET_DATA_GAP` gets "a minimum re-alert interval of 1 hour"
    /// regardless of the sink's configured default).
    pub fn dedup_window_override(&self) -> Option<Duration> {
        match self {
            AlertKind::MarketDataGap { .. } => Some(Duration::hours(1)),
            _ => None,
        }
    }
}

/// `floor(price / boundary_buffer)`, the bucket function spec.md §4.5
/// prescribes for boundary alerts. Falls back to bucket 0 if `buffer` is
/// non-positive (shouldn't happen with a sane config, but division by zero
/// must never panic here).
fn price_bucket(price: Decimal, buffer: Decimal) -> i64 {
    if buffer <= Decimal::ZERO {
        return 0;
    }
    (price / buffer).floor().to_i64().unwrap_or(0)
}

/// Given the configured milestone steps (spec.md §4.5, e.g. `[5000, 15000,
/// 30000]`) and the grid's cumulative realised profit, returns how many
/// steps have been crossed. `0` means no milestone has been reached yet and
/// callers should not raise an alert.
pub fn milestone_index(cumulative_profit: Decimal, steps: &[Decimal]) -> usize {
    steps.iter().filter(|s| cumulative_profit >= **s).count()
}

#[derive(Clone, Debug)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub dedup_key: String,
    pub severity: AlertSeverity,
    pub created_at: DateTime<Utc>,
    pub dispatch_attempts: u32,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(kind: AlertKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dedup_key: kind.dedup_key(),
            severity: kind.severity(),
            kind,
            created_at: now,
            dispatch_attempts: 0,
            dispatched_at: None,
        }
    }
}
