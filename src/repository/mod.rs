pub mod sqlx_impl;

use async_trait::async_trait;
use uuid::Uuid;

use crate::planner::types::{Grid, GridStatus, Order};

/// CRUD surface the HTTP API and Grid Planner drive a grid through. Narrower
/// than `ExecutionStore`/`MonitorStore` (spec.md §4.3/§4.4's transition and
/// tick ports), which stay scoped to exactly what those components need.
/// Grounded on the teacher's `SessionRepository` (`session/repository.rs`):
/// one trait, `Send + Sync`, no persistence mechanism leaking through.
#[async_trait]
pub trait GridRepository: Send + Sync + 'static {
    /// Persists a freshly-planned grid and its initial order set in one
    /// transaction (spec.md §4.2 step 5).
    async fn insert_grid(&self, grid: &Grid, orders: &[Order]) -> anyhow::Result<()>;

    async fn fetch_grid(&self, grid_id: Uuid) -> anyhow::Result<Option<Grid>>;

    async fn fetch_orders(&self, grid_id: Uuid) -> anyhow::Result<Vec<Order>>;

    async fn list_grids(
        &self,
        portfolio_id: Option<Uuid>,
        symbol: Option<&str>,
        status: Option<GridStatus>,
    ) -> anyhow::Result<Vec<Grid>>;

    async fn set_status(&self, grid_id: Uuid, status: GridStatus) -> anyhow::Result<()>;

    /// Cancels every PENDING order on a grid and marks it CANCELLED,
    /// preserving holdings (spec.md §6 `DELETE /api/grids/{id}`).
    async fn cancel_grid(&self, grid_id: Uuid) -> anyhow::Result<()>;

    /// Replaces a DYNAMIC grid's ladder around a new center price, cancelling
    /// existing PENDING orders and inserting the recomputed set, preserving
    /// `last_rebalanced_at` bookkeeping (spec.md §8 scenario S6).
    async fn rebalance_grid(
        &self,
        grid_id: Uuid,
        new_lower: rust_decimal::Decimal,
        new_upper: rust_decimal::Decimal,
        new_center: rust_decimal::Decimal,
        new_orders: &[Order],
    ) -> anyhow::Result<()>;
}

pub use sqlx_impl::SqlxRepository;
