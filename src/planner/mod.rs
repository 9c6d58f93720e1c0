pub mod dynamic;
pub mod rebalance;
pub mod sizing;
pub mod types;

pub use rebalance::run_rebalance_scan;
pub use sizing::{plan_grid, BoundsRequest, PlanRequest};
pub use types::{CancelReason, Grid, GridStatus, Order, OrderSide, OrderState, StrategyConfig};
