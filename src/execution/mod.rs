pub mod engine;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::alert::{AlertKind, AlertSink};
use crate::error::ExecutionError;
use crate::planner::types::{CancelReason, Grid, Order};
pub use types::{ExecutionEvent, Fill, FillObservation, TransitionResult};

/// Persistence boundary the Execution Engine commits through. Concurrency
/// control (the PENDING -> FILLED compare-and-swap) and the atomicity of
/// the order/cash/holding mutation are entirely this port's responsibility —
/// the engine itself stays pure. Mirrors the teacher's `SessionStore`
/// wrapping a `SessionRepository`: logic and persistence are split across
/// the trait boundary.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    /// Loads the grid, the order, and the portfolio's current cash/holding
    /// balances for `order.grid_id`'s symbol, all under one read. Returns
    /// `None` if the order no longer exists or is no longer PENDING (the
    /// idempotent-replay case).
    async fn load_for_transition(
        &self,
        order_id: Uuid,
    ) -> anyhow::Result<Option<(Grid, Order, Decimal, Decimal)>>;

    /// Atomically applies a computed `TransitionResult`: updates the order's
    /// state, adjusts the portfolio's cash/holding, persists any recreated
    /// order, and records the resulting events.
    async fn commit_transition(&self, result: &TransitionResult) -> anyhow::Result<()>;

    /// Sum of `realised_profit` across every FILLED SELL order on the grid,
    /// used to evaluate the `PROFIT_MILESTONE` threshold (spec.md §4.3 step
    /// 5).
    async fn cumulative_realised_profit(&self, grid_id: Uuid) -> anyhow::Result<Decimal>;

    /// How many orders are still PENDING on the grid. Zero means the ladder
    /// has nothing left to do (every level either parked or with no further
    /// cycle to run) and the grid can be marked COMPLETED.
    async fn remaining_pending_count(&self, grid_id: Uuid) -> anyhow::Result<u64>;

    /// Transitions the grid to COMPLETED (spec.md §3 status lifecycle).
    async fn mark_grid_completed(&self, grid_id: Uuid) -> anyhow::Result<()>;
}

/// Loads current state, computes the transition purely via
/// [`engine::apply_transition`], commits it, and publishes the resulting
/// alerts (spec.md §4.3 step 5: "On commit, publish the appropriate
/// event(s)" — `ORDER_FILLED`, `INSUFFICIENT_CASH`/`INSUFFICIENT_HOLDING`,
/// and `PROFIT_MILESTONE` all originate here, not in the Monitor). Idempotent:
/// if the order has already moved past PENDING (e.g. a retried tick
/// re-observes the same crossing), `load_for_transition` returns `None` and
/// this is a no-op — the same idempotent-replay contract as the teacher's
/// `recover_uncommitted`/`commit_batch` pair.
#[instrument(skip(store, alerts, milestone_steps, observation), fields(order_id = %observation.order_id))]
pub async fn process_fill(
    store: &dyn ExecutionStore,
    alerts: &AlertSink,
    milestone_steps: &[Decimal],
    observation: FillObservation,
) -> Result<Option<TransitionResult>, ExecutionError> {
    let Some((grid, order, cash_available, holding_available)) = store
        .load_for_transition(observation.order_id)
        .await
        .map_err(ExecutionError::Repository)?
    else {
        return Ok(None);
    };

    let outcome = engine::apply_transition(&grid, &order, cash_available, holding_available, &observation)?;

    store
        .commit_transition(&outcome)
        .await
        .map_err(ExecutionError::Repository)?;

    publish_outcome(store, alerts, milestone_steps, &grid, &outcome).await?;

    Ok(Some(outcome))
}

async fn publish_outcome(
    store: &dyn ExecutionStore,
    alerts: &AlertSink,
    milestone_steps: &[Decimal],
    grid: &Grid,
    outcome: &TransitionResult,
) -> Result<(), ExecutionError> {
    match outcome {
        TransitionResult::Filled { fill, .. } => {
            let _ = alerts
                .raise(AlertKind::OrderFilled {
                    grid_id: fill.grid_id,
                    order_id: fill.order_id,
                    level_index: fill.level_index,
                    side: fill.side,
                    price: fill.price,
                    quantity: fill.quantity,
                })
                .await;

            if fill.realised_profit.is_some() {
                let cumulative = store
                    .cumulative_realised_profit(grid.id)
                    .await
                    .map_err(ExecutionError::Repository)?;
                let idx = crate::alert::types::milestone_index(cumulative, milestone_steps);
                if idx > 0 {
                    let _ = alerts
                        .raise(AlertKind::ProfitMilestone {
                            grid_id: grid.id,
                            cumulative_profit: cumulative,
                            milestone_index: idx,
                        })
                        .await;
                }
            }

            let remaining = store
                .remaining_pending_count(grid.id)
                .await
                .map_err(ExecutionError::Repository)?;
            if remaining == 0 {
                store
                    .mark_grid_completed(grid.id)
                    .await
                    .map_err(ExecutionError::Repository)?;
                let _ = alerts.raise(AlertKind::GridCompleted { grid_id: grid.id }).await;
            }
        }
        TransitionResult::Cancelled { order_id, reason } => {
            let kind = match reason {
                CancelReason::InsufficientCash => Some(AlertKind::InsufficientCash {
                    grid_id: grid.id,
                    order_id: *order_id,
                }),
                CancelReason::InsufficientHolding => Some(AlertKind::InsufficientHolding {
                    grid_id: grid.id,
                    order_id: *order_id,
                }),
                // Cancellations the engine never produces itself (grid
                // deletion, manual rebalance) carry no alert here; the
                // caller that initiated them is responsible.
                CancelReason::GridCancelled | CancelReason::Rebalanced => None,
            };
            if let Some(kind) = kind {
                let _ = alerts.raise(kind).await;
            }
        }
    }

    Ok(())
}
