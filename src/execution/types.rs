//! Execution Engine domain types (spec.md §4.3). Grounded on the teacher's
//! `execution/types.rs` (`ReservedBatch`/`ChunkResult`/`UserResult` shape),
//! generalized from "batch of reserved chunks" to "one order transition."

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::planner::types::{CancelReason, Order, OrderSide};

/// One observed price crossing an order's trigger, handed to the engine by
/// the Grid Monitor.
#[derive(Clone, Debug)]
pub struct FillObservation {
    pub order_id: Uuid,
    pub observed_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// The fully-computed effect of filling one order: the fill itself plus the
/// cash/holding deltas the repository must apply atomically alongside the
/// order state transition.
#[derive(Clone, Debug)]
pub struct Fill {
    pub order_id: Uuid,
    pub grid_id: Uuid,
    pub side: OrderSide,
    pub level_index: u32,
    pub quantity: Decimal,
    /// The order's ladder level price — always the fill price, never the
    /// observed tick (spec.md §4.3 step 2, §8 invariant 4: `filled_price ==
    /// level_price` for every FILLED order).
    pub price: Decimal,
    /// The price tick that triggered the fill, kept for audit only; it is
    /// never used to compute cash/holding deltas or realised profit.
    pub trigger_price: Decimal,
    pub filled_at: DateTime<Utc>,
    pub cash_delta: Decimal,
    pub holding_delta: Decimal,
    pub realised_profit: Option<Decimal>,
}

#[derive(Clone, Debug)]
pub enum ExecutionEvent {
    Filled(Fill),
    /// Inventory landed beyond the ladder's boundary (a BUY fill at the top
    /// level, or a SELL fill at the bottom level) and no paired order could
    /// be recreated (spec.md §4.3 step 4, §8 invariant 5).
    Parked { grid_id: Uuid, level_index: u32, side: OrderSide },
    OrderCancelled { order_id: Uuid, reason: CancelReason },
}

/// What `apply_transition` decided should happen to one PENDING order: it
/// fills (optionally recreating the paired order one level over per the
/// cycle rule) or it is cancelled outright (insufficient cash/holding).
#[derive(Clone, Debug)]
pub enum TransitionResult {
    Filled {
        fill: Fill,
        recreated_order: Option<Order>,
        events: Vec<ExecutionEvent>,
    },
    Cancelled {
        order_id: Uuid,
        reason: CancelReason,
    },
}
