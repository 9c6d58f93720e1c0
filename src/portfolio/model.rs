//! Portfolio/Holding domain types (spec.md §3, §4.7 **[AMBIENT]**). Dropped
//! by the distillation but required to make the Execution Engine's
//! cash/holding mutations real. Grounded on the teacher's `SessionRepository`
//! trait shape (`session/repository.rs`): a narrow `async_trait` port with no
//! knowledge of its own persistence mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::planner::types::OrderSide;

#[derive(Clone, Debug)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    pub cash_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Holding {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

#[async_trait]
pub trait PortfolioRepository: Send + Sync + 'static {
    async fn create(&self, name: &str, initial_cash: Decimal) -> anyhow::Result<Portfolio>;

    async fn fetch(&self, portfolio_id: Uuid) -> anyhow::Result<Option<Portfolio>>;

    /// Every portfolio on record. Used by the periodic revaluation task
    /// (spec.md §4.6) to enumerate what needs mark-to-market recomputation.
    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>>;

    async fn holdings(&self, portfolio_id: Uuid) -> anyhow::Result<Vec<Holding>>;

    /// Audit-tracked cash override (spec.md §6 `POST
    /// /api/portfolios/{id}/update-cash`). Bypasses the Execution Engine
    /// entirely and emits no grid alerts.
    async fn set_cash_balance(&self, portfolio_id: Uuid, new_cash_balance: Decimal) -> anyhow::Result<()>;

    /// Applies a manual fill outside any grid's ladder (spec.md §6 `POST
    /// /api/transactions`, `source = MANUAL`): mutates cash and the
    /// holding's quantity/average-cost the same way a grid fill would, but
    /// with no order row, no paired recreation, and no grid alert.
    async fn apply_manual_transaction(
        &self,
        portfolio_id: Uuid,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> anyhow::Result<()>;
}
