//! Request/response shapes for the HTTP API surface (spec.md §6). Kept
//! separate from the domain types in `planner::types` the way the pack's
//! `cooprefr-bettersys` API module keeps its `SignalQuery`/`SignalResponse`
//! structs next to the handlers that use them rather than reusing internal
//! model types directly as wire types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::planner::types::{CancelReason, Grid, GridStatus, Order, OrderSide, OrderState, StrategyConfig};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfigRequest {
    Static,
    Dynamic {
        multiplier: Decimal,
        lookback_days: u32,
    },
}

#[derive(Debug, Deserialize)]
pub struct CreateGridRequest {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub name: String,
    /// Required unless `strategy_config` requests DYNAMIC bounds (spec.md
    /// §4.2 step 4 computes `lower`/`upper` itself in that case).
    pub lower_price: Option<Decimal>,
    pub upper_price: Option<Decimal>,
    pub grid_count: u32,
    pub investment_amount: Decimal,
    pub strategy_config: Option<StrategyConfigRequest>,
}

#[derive(Debug, Serialize)]
pub struct CreateGridResponse {
    pub grid_id: Uuid,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListGridsQuery {
    pub portfolio_id: Option<Uuid>,
    pub symbol: Option<String>,
    pub status: Option<GridStatusQuery>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridStatusQuery {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl From<GridStatusQuery> for GridStatus {
    fn from(q: GridStatusQuery) -> Self {
        match q {
            GridStatusQuery::Active => GridStatus::Active,
            GridStatusQuery::Paused => GridStatus::Paused,
            GridStatusQuery::Completed => GridStatus::Completed,
            GridStatusQuery::Cancelled => GridStatus::Cancelled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GridSummary {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub status: GridStatus,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub level_count: u32,
    pub investment_amount: Decimal,
    pub current_price: Option<Decimal>,
    pub cumulative_realised_profit: Decimal,
    pub pending_order_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderDto {
    pub id: Uuid,
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

impl From<&Order> for OrderDto {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            level_index: o.level_index,
            level_price: o.level_price,
            side: o.side,
            quantity: o.quantity,
            state: o.state,
            paired_level: o.paired_level,
            filled_at: o.filled_at,
            filled_price: o.filled_price,
            trigger_price: o.trigger_price,
            realised_profit: o.realised_profit,
            cancel_reason: o.cancel_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GridDetail {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub status: GridStatus,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub level_count: u32,
    pub investment_amount: Decimal,
    pub strategy_config: StrategyConfig,
    pub created_at: DateTime<Utc>,
    pub last_rebalanced_at: Option<DateTime<Utc>>,
    pub orders: Vec<OrderDto>,
}

impl GridDetail {
    pub fn new(grid: &Grid, orders: &[Order]) -> Self {
        Self {
            id: grid.id,
            portfolio_id: grid.portfolio_id,
            symbol: grid.symbol.clone(),
            name: grid.name.clone(),
            status: grid.status,
            lower_price: grid.lower_price,
            upper_price: grid.upper_price,
            level_count: grid.level_count,
            investment_amount: grid.investment_amount,
            strategy_config: grid.strategy_config.clone(),
            created_at: grid.created_at,
            last_rebalanced_at: grid.last_rebalanced_at,
            orders: orders.iter().map(OrderDto::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl From<TransactionType> for OrderSide {
    fn from(t: TransactionType) -> Self {
        match t {
            TransactionType::Buy => OrderSide::Buy,
            TransactionType::Sell => OrderSide::Sell,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub fees: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub applied: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCashRequest {
    pub new_cash_balance: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateCashResponse {
    pub portfolio_id: Uuid,
    pub cash_balance: Decimal,
}
