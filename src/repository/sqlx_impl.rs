//! Single sqlx-backed implementation of every port this crate persists
//! through (`ExecutionStore`, `MonitorStore`, `AlertStore`,
//! `PortfolioRepository`, `GridRepository`). Grounded on the teacher's
//! `SqlxSessionRepository`, which implements exactly one trait — here the
//! same row-mapping/narrowing-helper style is reused across five, the way
//! the teacher's own `backend` binary composes several repositories behind
//! one `AnyPool`.
//!
//! `rust_decimal::Decimal` has no lossless native bind across every
//! `sqlx::Any` backend, so every price/quantity/cash column round-trips
//! through its decimal string representation (§9 design note). Arithmetic on
//! those columns therefore happens in Rust, read-modify-write, inside the
//! transaction — never as SQL `+`/`SUM`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::alert::{Alert, AlertKind, AlertSeverity, AlertStore};
use crate::execution::{ExecutionStore, TransitionResult};
use crate::market::Market;
use crate::monitor::MonitorStore;
use crate::planner::types::{CancelReason, Grid, GridStatus, Order, OrderSide, OrderState, StrategyConfig};
use crate::portfolio::{Holding, Portfolio, PortfolioRepository};

use super::GridRepository;

pub struct SqlxRepository {
    pool: Arc<AnyPool>,
}

impl SqlxRepository {
    pub fn new(pool: Arc<AnyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/* =========================
Narrowing + format helpers
========================= */

fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    if v < 0 || v > u32::MAX as i64 {
        return Err(anyhow!("out of range for u32: {v}"));
    }
    Ok(v as u32)
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u32_to_i64(v: u32) -> i64 {
    v as i64
}

fn dec_to_text(d: Decimal) -> String {
    d.to_string()
}

fn text_to_dec(s: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("invalid decimal string: {s}"))
}

fn dt_to_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn text_to_dt(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp: {s}"))?
        .with_timezone(&Utc))
}

fn grid_status_to_text(s: GridStatus) -> &'static str {
    match s {
        GridStatus::Active => "ACTIVE",
        GridStatus::Paused => "PAUSED",
        GridStatus::Completed => "COMPLETED",
        GridStatus::Cancelled => "CANCELLED",
    }
}

fn text_to_grid_status(s: &str) -> anyhow::Result<GridStatus> {
    Ok(match s {
        "ACTIVE" => GridStatus::Active,
        "PAUSED" => GridStatus::Paused,
        "COMPLETED" => GridStatus::Completed,
        "CANCELLED" => GridStatus::Cancelled,
        other => return Err(anyhow!("unknown grid status: {other}")),
    })
}

fn order_side_to_text(s: OrderSide) -> &'static str {
    match s {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn text_to_order_side(s: &str) -> anyhow::Result<OrderSide> {
    Ok(match s {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        other => return Err(anyhow!("unknown order side: {other}")),
    })
}

fn order_state_to_text(s: OrderState) -> &'static str {
    match s {
        OrderState::Pending => "PENDING",
        OrderState::Filled => "FILLED",
        OrderState::Cancelled => "CANCELLED",
    }
}

fn text_to_order_state(s: &str) -> anyhow::Result<OrderState> {
    Ok(match s {
        "PENDING" => OrderState::Pending,
        "FILLED" => OrderState::Filled,
        "CANCELLED" => OrderState::Cancelled,
        other => return Err(anyhow!("unknown order state: {other}")),
    })
}

fn cancel_reason_to_text(r: &CancelReason) -> &'static str {
    match r {
        CancelReason::InsufficientCash => "INSUFFICIENT_CASH",
        CancelReason::InsufficientHolding => "INSUFFICIENT_HOLDING",
        CancelReason::GridCancelled => "GRID_CANCELLED",
        CancelReason::Rebalanced => "REBALANCED",
    }
}

fn text_to_cancel_reason(s: &str) -> anyhow::Result<CancelReason> {
    Ok(match s {
        "INSUFFICIENT_CASH" => CancelReason::InsufficientCash,
        "INSUFFICIENT_HOLDING" => CancelReason::InsufficientHolding,
        "GRID_CANCELLED" => CancelReason::GridCancelled,
        "REBALANCED" => CancelReason::Rebalanced,
        other => return Err(anyhow!("unknown cancel reason: {other}")),
    })
}

fn severity_to_text(s: AlertSeverity) -> &'static str {
    match s {
        AlertSeverity::Info => "INFO",
        AlertSeverity::Warning => "WARNING",
        AlertSeverity::Critical => "CRITICAL",
    }
}

fn text_to_severity(s: &str) -> anyhow::Result<AlertSeverity> {
    Ok(match s {
        "INFO" => AlertSeverity::Info,
        "WARNING" => AlertSeverity::Warning,
        "CRITICAL" => AlertSeverity::Critical,
        other => return Err(anyhow!("unknown alert severity: {other}")),
    })
}

/* =========================
Row mapping
========================= */

fn row_to_grid(r: &AnyRow) -> anyhow::Result<Grid> {
    let symbol: String = r.try_get("symbol")?;
    let market = Market::classify(&symbol);
    let strategy_config_json: String = r.try_get("strategy_config_json")?;
    let last_rebalanced_at: Option<String> = r.try_get("last_rebalanced_at")?;

    Ok(Grid {
        id: Uuid::parse_str(&r.try_get::<String, _>("grid_id")?)?,
        portfolio_id: Uuid::parse_str(&r.try_get::<String, _>("portfolio_id")?)?,
        symbol,
        name: r.try_get("name")?,
        lower_price: text_to_dec(&r.try_get::<String, _>("lower_price")?)?,
        upper_price: text_to_dec(&r.try_get::<String, _>("upper_price")?)?,
        level_count: i64_to_u32(r.try_get("level_count")?)?,
        investment_amount: text_to_dec(&r.try_get::<String, _>("investment_amount")?)?,
        status: text_to_grid_status(&r.try_get::<String, _>("status")?)?,
        strategy_config: serde_json::from_str(&strategy_config_json)
            .context("malformed strategy_config_json")?,
        created_at: text_to_dt(&r.try_get::<String, _>("created_at")?)?,
        last_rebalanced_at: last_rebalanced_at.map(|s| text_to_dt(&s)).transpose()?,
        market,
    })
}

fn row_to_order(r: &AnyRow) -> anyhow::Result<Order> {
    let filled_at: Option<String> = r.try_get("filled_at")?;
    let filled_price: Option<String> = r.try_get("filled_price")?;
    let trigger_price: Option<String> = r.try_get("trigger_price")?;
    let realised_profit: Option<String> = r.try_get("realised_profit")?;
    let cancel_reason: Option<String> = r.try_get("cancel_reason")?;
    let paired_level: Option<i64> = r.try_get("paired_level")?;

    Ok(Order {
        id: Uuid::parse_str(&r.try_get::<String, _>("order_id")?)?,
        grid_id: Uuid::parse_str(&r.try_get::<String, _>("grid_id")?)?,
        level_index: i64_to_u32(r.try_get("level_index")?)?,
        level_price: text_to_dec(&r.try_get::<String, _>("level_price")?)?,
        side: text_to_order_side(&r.try_get::<String, _>("side")?)?,
        quantity: text_to_dec(&r.try_get::<String, _>("quantity")?)?,
        state: text_to_order_state(&r.try_get::<String, _>("state")?)?,
        paired_level: paired_level.map(i64_to_u32).transpose()?,
        filled_at: filled_at.map(|s| text_to_dt(&s)).transpose()?,
        filled_price: filled_price.map(|s| text_to_dec(&s)).transpose()?,
        trigger_price: trigger_price.map(|s| text_to_dec(&s)).transpose()?,
        realised_profit: realised_profit.map(|s| text_to_dec(&s)).transpose()?,
        cancel_reason: cancel_reason.map(|s| text_to_cancel_reason(&s)).transpose()?,
    })
}

fn row_to_alert(r: &AnyRow) -> anyhow::Result<Alert> {
    let kind_json: String = r.try_get("kind_json")?;
    let dispatched_at: Option<String> = r.try_get("dispatched_at")?;

    Ok(Alert {
        id: Uuid::parse_str(&r.try_get::<String, _>("alert_id")?)?,
        kind: serde_json::from_str::<AlertKind>(&kind_json).context("malformed kind_json")?,
        dedup_key: r.try_get("dedup_key")?,
        severity: text_to_severity(&r.try_get::<String, _>("severity")?)?,
        created_at: text_to_dt(&r.try_get::<String, _>("created_at")?)?,
        dispatch_attempts: i64_to_u32(r.try_get::<i64, _>("dispatch_attempts")?)?,
        dispatched_at: dispatched_at.map(|s| text_to_dt(&s)).transpose()?,
    })
}

fn row_to_portfolio(r: &AnyRow) -> anyhow::Result<Portfolio> {
    Ok(Portfolio {
        id: Uuid::parse_str(&r.try_get::<String, _>("portfolio_id")?)?,
        name: r.try_get("name")?,
        cash_balance: text_to_dec(&r.try_get::<String, _>("cash_balance")?)?,
        created_at: text_to_dt(&r.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_holding(r: &AnyRow) -> anyhow::Result<Holding> {
    Ok(Holding {
        portfolio_id: Uuid::parse_str(&r.try_get::<String, _>("portfolio_id")?)?,
        symbol: r.try_get("symbol")?,
        quantity: text_to_dec(&r.try_get::<String, _>("quantity")?)?,
        average_cost: text_to_dec(&r.try_get::<String, _>("average_cost")?)?,
    })
}

/* =========================
ExecutionStore
========================= */

#[async_trait]
impl ExecutionStore for SqlxRepository {
    async fn load_for_transition(
        &self,
        order_id: Uuid,
    ) -> anyhow::Result<Option<(Grid, Order, Decimal, Decimal)>> {
        let Some(order_row) = sqlx::query(
            r#"SELECT * FROM orders WHERE order_id = ? AND state = 'PENDING';"#,
        )
        .bind(order_id.to_string())
        .fetch_optional(self.pool.as_ref())
        .await?
        else {
            return Ok(None);
        };
        let order = row_to_order(&order_row)?;

        let grid_row = sqlx::query(r#"SELECT * FROM grids WHERE grid_id = ?;"#)
            .bind(order.grid_id.to_string())
            .fetch_optional(self.pool.as_ref())
            .await?;
        let Some(grid_row) = grid_row else {
            return Ok(None);
        };
        let grid = row_to_grid(&grid_row)?;

        let portfolio_row = sqlx::query(r#"SELECT * FROM portfolios WHERE portfolio_id = ?;"#)
            .bind(grid.portfolio_id.to_string())
            .fetch_one(self.pool.as_ref())
            .await?;
        let cash_available = text_to_dec(&portfolio_row.try_get::<String, _>("cash_balance")?)?;

        let holding_row = sqlx::query(
            r#"SELECT * FROM holdings WHERE portfolio_id = ? AND symbol = ?;"#,
        )
        .bind(grid.portfolio_id.to_string())
        .bind(&grid.symbol)
        .fetch_optional(self.pool.as_ref())
        .await?;
        let holding_available = match holding_row {
            Some(r) => text_to_dec(&r.try_get::<String, _>("quantity")?)?,
            None => Decimal::ZERO,
        };

        Ok(Some((grid, order, cash_available, holding_available)))
    }

    async fn commit_transition(&self, result: &TransitionResult) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        match result {
            TransitionResult::Filled {
                fill,
                recreated_order,
                events: _,
            } => {
                // `filled_price` is the deterministic level price (the cycle
                // rule always fills at the level, never at the observed
                // tick); `trigger_price` is the observed crossing that woke
                // the order up. Reconciling the two here is the only place
                // that distinction has to survive past the engine.
                let res = sqlx::query(
                    r#"
UPDATE orders
SET state = 'FILLED', filled_at = ?, filled_price = ?, trigger_price = ?, realised_profit = ?
WHERE order_id = ? AND state = 'PENDING';
"#,
                )
                .bind(dt_to_text(fill.filled_at))
                .bind(dec_to_text(fill.price))
                .bind(dec_to_text(fill.trigger_price))
                .bind(fill.realised_profit.map(dec_to_text))
                .bind(fill.order_id.to_string())
                .execute(&mut *tx)
                .await?;

                if res.rows_affected() != 1 {
                    // Already committed by a previous attempt at this
                    // transition; idempotent no-op.
                    tx.rollback().await?;
                    return Ok(());
                }

                let grid_row = sqlx::query(r#"SELECT portfolio_id, symbol FROM grids WHERE grid_id = ?;"#)
                    .bind(fill.grid_id.to_string())
                    .fetch_one(&mut *tx)
                    .await?;
                let portfolio_id: String = grid_row.try_get("portfolio_id")?;
                let symbol: String = grid_row.try_get("symbol")?;

                apply_cash_delta(&mut tx, &portfolio_id, fill.cash_delta).await?;
                apply_holding_delta(&mut tx, &portfolio_id, &symbol, fill.holding_delta, fill.side, fill.price)
                    .await?;

                if let Some(recreated) = recreated_order {
                    let existing = sqlx::query(
                        r#"SELECT order_id FROM orders WHERE grid_id = ? AND level_index = ? AND state = 'PENDING';"#,
                    )
                    .bind(recreated.grid_id.to_string())
                    .bind(u32_to_i64(recreated.level_index))
                    .fetch_optional(&mut *tx)
                    .await?;

                    // S3: a multi-level price jump within one tick can fill
                    // two orders whose recreated pairs land on the same
                    // level. The first insert wins; the duplicate is
                    // skipped rather than violating the one-order-per-level
                    // invariant.
                    if existing.is_none() {
                        insert_order(&mut tx, recreated).await?;
                    } else {
                        tracing::debug!(
                            grid_id = %recreated.grid_id,
                            level_index = recreated.level_index,
                            "skipping recreated order: level already has a pending order"
                        );
                    }
                }
            }
            TransitionResult::Cancelled { order_id, reason } => {
                sqlx::query(
                    r#"UPDATE orders SET state = 'CANCELLED', cancel_reason = ? WHERE order_id = ? AND state = 'PENDING';"#,
                )
                .bind(cancel_reason_to_text(reason))
                .bind(order_id.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn cumulative_realised_profit(&self, grid_id: Uuid) -> anyhow::Result<Decimal> {
        let rows = sqlx::query(
            r#"SELECT realised_profit FROM orders WHERE grid_id = ? AND state = 'FILLED' AND realised_profit IS NOT NULL;"#,
        )
        .bind(grid_id.to_string())
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut total = Decimal::ZERO;
        for r in rows {
            let profit: String = r.try_get("realised_profit")?;
            total += text_to_dec(&profit)?;
        }
        Ok(total)
    }

    async fn remaining_pending_count(&self, grid_id: Uuid) -> anyhow::Result<u64> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM orders WHERE grid_id = ? AND state = 'PENDING';"#)
            .bind(grid_id.to_string())
            .fetch_one(self.pool.as_ref())
            .await?;
        i64_to_u64(row.try_get("n")?)
    }

    async fn mark_grid_completed(&self, grid_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE grids SET status = 'COMPLETED' WHERE grid_id = ?;"#)
            .bind(grid_id.to_string())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}

async fn insert_order(tx: &mut sqlx::Transaction<'_, sqlx::Any>, order: &Order) -> anyhow::Result<()> {
    sqlx::query(
        r#"
INSERT INTO orders (
  order_id, grid_id, level_index, level_price, side, quantity, state,
  paired_level, filled_at, filled_price, trigger_price, realised_profit, cancel_reason
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
    )
    .bind(order.id.to_string())
    .bind(order.grid_id.to_string())
    .bind(u32_to_i64(order.level_index))
    .bind(dec_to_text(order.level_price))
    .bind(order_side_to_text(order.side))
    .bind(dec_to_text(order.quantity))
    .bind(order_state_to_text(order.state))
    .bind(order.paired_level.map(u32_to_i64))
    .bind(order.filled_at.map(dt_to_text))
    .bind(order.filled_price.map(dec_to_text))
    .bind(order.trigger_price.map(dec_to_text))
    .bind(order.realised_profit.map(dec_to_text))
    .bind(order.cancel_reason.as_ref().map(cancel_reason_to_text))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_cash_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    portfolio_id: &str,
    delta: Decimal,
) -> anyhow::Result<()> {
    let row = sqlx::query(r#"SELECT cash_balance FROM portfolios WHERE portfolio_id = ?;"#)
        .bind(portfolio_id)
        .fetch_one(&mut **tx)
        .await?;
    let current = text_to_dec(&row.try_get::<String, _>("cash_balance")?)?;
    let updated = current + delta;

    sqlx::query(r#"UPDATE portfolios SET cash_balance = ? WHERE portfolio_id = ?;"#)
        .bind(dec_to_text(updated))
        .bind(portfolio_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn apply_holding_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    portfolio_id: &str,
    symbol: &str,
    delta: Decimal,
    side: OrderSide,
    fill_price: Decimal,
) -> anyhow::Result<()> {
    let existing = sqlx::query(
        r#"SELECT quantity, average_cost FROM holdings WHERE portfolio_id = ? AND symbol = ?;"#,
    )
    .bind(portfolio_id)
    .bind(symbol)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some(row) => {
            let quantity = text_to_dec(&row.try_get::<String, _>("quantity")?)?;
            let average_cost = text_to_dec(&row.try_get::<String, _>("average_cost")?)?;
            let new_quantity = quantity + delta;

            // A BUY fill moves weighted-average cost; a SELL fill just
            // reduces quantity and leaves the remaining lot's cost basis
            // alone.
            let new_average_cost = if side == OrderSide::Buy && new_quantity > Decimal::ZERO {
                (quantity * average_cost + delta * fill_price) / new_quantity
            } else {
                average_cost
            };

            sqlx::query(
                r#"UPDATE holdings SET quantity = ?, average_cost = ? WHERE portfolio_id = ? AND symbol = ?;"#,
            )
            .bind(dec_to_text(new_quantity))
            .bind(dec_to_text(new_average_cost))
            .bind(portfolio_id)
            .bind(symbol)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            let average_cost = if side == OrderSide::Buy { fill_price } else { Decimal::ZERO };
            sqlx::query(
                r#"INSERT INTO holdings (portfolio_id, symbol, quantity, average_cost) VALUES (?, ?, ?, ?);"#,
            )
            .bind(portfolio_id)
            .bind(symbol)
            .bind(dec_to_text(delta))
            .bind(dec_to_text(average_cost))
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/* =========================
MonitorStore
========================= */

#[async_trait]
impl MonitorStore for SqlxRepository {
    async fn active_grids_with_orders(&self) -> anyhow::Result<Vec<(Grid, Vec<Order>)>> {
        let grid_rows = sqlx::query(r#"SELECT * FROM grids WHERE status = 'ACTIVE';"#)
            .fetch_all(self.pool.as_ref())
            .await?;

        let mut out = Vec::with_capacity(grid_rows.len());
        for row in grid_rows {
            let grid = row_to_grid(&row)?;
            let order_rows = sqlx::query(r#"SELECT * FROM orders WHERE grid_id = ? AND state = 'PENDING';"#)
                .bind(grid.id.to_string())
                .fetch_all(self.pool.as_ref())
                .await?;
            let orders = order_rows.iter().map(row_to_order).collect::<anyhow::Result<Vec<_>>>()?;
            out.push((grid, orders));
        }
        Ok(out)
    }
}

/* =========================
AlertStore
========================= */

#[async_trait]
impl AlertStore for SqlxRepository {
    async fn find_recent_by_dedup_key(&self, dedup_key: &str) -> anyhow::Result<Option<Alert>> {
        let row = sqlx::query(
            r#"SELECT * FROM alerts WHERE dedup_key = ? ORDER BY created_at DESC LIMIT 1;"#,
        )
        .bind(dedup_key)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(row_to_alert).transpose()
    }

    async fn insert_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        let kind_json = serde_json::to_string(&alert.kind)?;
        sqlx::query(
            r#"
INSERT INTO alerts (alert_id, kind_json, dedup_key, severity, created_at, dispatch_attempts, dispatched_at)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(alert.id.to_string())
        .bind(kind_json)
        .bind(&alert.dedup_key)
        .bind(severity_to_text(alert.severity))
        .bind(dt_to_text(alert.created_at))
        .bind(alert.dispatch_attempts as i64)
        .bind(alert.dispatched_at.map(dt_to_text))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn pending_alerts(&self, limit: usize) -> anyhow::Result<Vec<Alert>> {
        let rows = sqlx::query(
            r#"SELECT * FROM alerts WHERE dispatched_at IS NULL ORDER BY created_at ASC LIMIT ?;"#,
        )
        .bind(limit as i64)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(row_to_alert).collect()
    }

    async fn mark_dispatched(&self, alert_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE alerts SET dispatched_at = ? WHERE alert_id = ?;"#)
            .bind(dt_to_text(at))
            .bind(alert_id.to_string())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn record_dispatch_attempt(&self, alert_id: Uuid) -> anyhow::Result<u32> {
        sqlx::query(r#"UPDATE alerts SET dispatch_attempts = dispatch_attempts + 1 WHERE alert_id = ?;"#)
            .bind(alert_id.to_string())
            .execute(self.pool.as_ref())
            .await?;

        let row = sqlx::query(r#"SELECT dispatch_attempts FROM alerts WHERE alert_id = ?;"#)
            .bind(alert_id.to_string())
            .fetch_one(self.pool.as_ref())
            .await?;
        i64_to_u32(row.try_get("dispatch_attempts")?)
    }
}

/* =========================
PortfolioRepository
========================= */

#[async_trait]
impl PortfolioRepository for SqlxRepository {
    async fn create(&self, name: &str, initial_cash: Decimal) -> anyhow::Result<Portfolio> {
        let portfolio = Portfolio {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cash_balance: initial_cash,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO portfolios (portfolio_id, name, cash_balance, created_at) VALUES (?, ?, ?, ?);"#,
        )
        .bind(portfolio.id.to_string())
        .bind(&portfolio.name)
        .bind(dec_to_text(portfolio.cash_balance))
        .bind(dt_to_text(portfolio.created_at))
        .execute(self.pool.as_ref())
        .await?;

        Ok(portfolio)
    }

    async fn fetch(&self, portfolio_id: Uuid) -> anyhow::Result<Option<Portfolio>> {
        let row = sqlx::query(r#"SELECT * FROM portfolios WHERE portfolio_id = ?;"#)
            .bind(portfolio_id.to_string())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(row_to_portfolio).transpose()
    }

    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>> {
        let rows = sqlx::query(r#"SELECT * FROM portfolios;"#)
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(row_to_portfolio).collect()
    }

    async fn holdings(&self, portfolio_id: Uuid) -> anyhow::Result<Vec<Holding>> {
        let rows = sqlx::query(r#"SELECT * FROM holdings WHERE portfolio_id = ?;"#)
            .bind(portfolio_id.to_string())
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(row_to_holding).collect()
    }

    async fn set_cash_balance(&self, portfolio_id: Uuid, new_cash_balance: Decimal) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE portfolios SET cash_balance = ? WHERE portfolio_id = ?;"#)
            .bind(dec_to_text(new_cash_balance))
            .bind(portfolio_id.to_string())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn apply_manual_transaction(
        &self,
        portfolio_id: Uuid,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> anyhow::Result<()> {
        let portfolio_id = portfolio_id.to_string();
        let gross = quantity * price;
        let cash_delta = match side {
            OrderSide::Buy => -gross - fees,
            OrderSide::Sell => gross - fees,
        };
        let holding_delta = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };

        let mut tx = self.pool.begin().await?;
        apply_cash_delta(&mut tx, &portfolio_id, cash_delta).await?;
        apply_holding_delta(&mut tx, &portfolio_id, symbol, holding_delta, side, price).await?;
        tx.commit().await?;
        Ok(())
    }
}

/* =========================
GridRepository
========================= */

#[async_trait]
impl GridRepository for SqlxRepository {
    async fn insert_grid(&self, grid: &Grid, orders: &[Order]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
INSERT INTO grids (
  grid_id, portfolio_id, symbol, name, lower_price, upper_price, level_count,
  investment_amount, status, strategy_config_json, created_at, last_rebalanced_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(grid.id.to_string())
        .bind(grid.portfolio_id.to_string())
        .bind(&grid.symbol)
        .bind(&grid.name)
        .bind(dec_to_text(grid.lower_price))
        .bind(dec_to_text(grid.upper_price))
        .bind(u32_to_i64(grid.level_count))
        .bind(dec_to_text(grid.investment_amount))
        .bind(grid_status_to_text(grid.status))
        .bind(serde_json::to_string(&grid.strategy_config)?)
        .bind(dt_to_text(grid.created_at))
        .bind(grid.last_rebalanced_at.map(dt_to_text))
        .execute(&mut *tx)
        .await?;

        for order in orders {
            insert_order(&mut tx, order).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_grid(&self, grid_id: Uuid) -> anyhow::Result<Option<Grid>> {
        let row = sqlx::query(r#"SELECT * FROM grids WHERE grid_id = ?;"#)
            .bind(grid_id.to_string())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(row_to_grid).transpose()
    }

    async fn fetch_orders(&self, grid_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let rows = sqlx::query(r#"SELECT * FROM orders WHERE grid_id = ? ORDER BY level_index;"#)
            .bind(grid_id.to_string())
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(row_to_order).collect()
    }

    async fn list_grids(
        &self,
        portfolio_id: Option<Uuid>,
        symbol: Option<&str>,
        status: Option<GridStatus>,
    ) -> anyhow::Result<Vec<Grid>> {
        // `grids` is small enough per portfolio that filtering in Rust after
        // one unfiltered fetch avoids hand-building a dynamic WHERE clause
        // across backends, the same tradeoff already made for
        // `cumulative_realised_profit`.
        let rows = sqlx::query(r#"SELECT * FROM grids;"#)
            .fetch_all(self.pool.as_ref())
            .await?;

        let mut out = Vec::new();
        for row in rows {
            let grid = row_to_grid(&row)?;
            if let Some(pid) = portfolio_id {
                if grid.portfolio_id != pid {
                    continue;
                }
            }
            if let Some(sym) = symbol {
                if grid.symbol != sym {
                    continue;
                }
            }
            if let Some(st) = status {
                if grid.status != st {
                    continue;
                }
            }
            out.push(grid);
        }
        Ok(out)
    }

    async fn set_status(&self, grid_id: Uuid, status: GridStatus) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE grids SET status = ? WHERE grid_id = ?;"#)
            .bind(grid_status_to_text(status))
            .bind(grid_id.to_string())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn cancel_grid(&self, grid_id: Uuid) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"UPDATE orders SET state = 'CANCELLED', cancel_reason = 'GRID_CANCELLED' WHERE grid_id = ? AND state = 'PENDING';"#,
        )
        .bind(grid_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"UPDATE grids SET status = 'CANCELLED' WHERE grid_id = ?;"#)
            .bind(grid_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn rebalance_grid(
        &self,
        grid_id: Uuid,
        new_lower: Decimal,
        new_upper: Decimal,
        new_center: Decimal,
        new_orders: &[Order],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let grid_row = sqlx::query(r#"SELECT strategy_config_json FROM grids WHERE grid_id = ?;"#)
            .bind(grid_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let strategy_config_json: String = grid_row.try_get("strategy_config_json")?;
        let mut strategy_config: StrategyConfig = serde_json::from_str(&strategy_config_json)?;
        if let StrategyConfig::Dynamic { center_price, .. } = &mut strategy_config {
            *center_price = new_center;
        }

        sqlx::query(
            r#"UPDATE orders SET state = 'CANCELLED', cancel_reason = 'REBALANCED' WHERE grid_id = ? AND state = 'PENDING';"#,
        )
        .bind(grid_id.to_string())
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        sqlx::query(
            r#"UPDATE grids SET lower_price = ?, upper_price = ?, strategy_config_json = ?, last_rebalanced_at = ? WHERE grid_id = ?;"#,
        )
        .bind(dec_to_text(new_lower))
        .bind(dec_to_text(new_upper))
        .bind(serde_json::to_string(&strategy_config)?)
        .bind(dt_to_text(now))
        .bind(grid_id.to_string())
        .execute(&mut *tx)
        .await?;

        for order in new_orders {
            insert_order(&mut tx, order).await?;
        }

        tx.commit().await?;

        // GRID_REBALANCED is an informational event, not one of the
        // exhaustive AlertKind variants: it never competes for an operator's
        // attention the way a boundary breach or a fill does, so it is
        // logged rather than raised through the AlertSink.
        tracing::info!(%grid_id, %new_lower, %new_upper, %new_center, "grid rebalanced");

        Ok(())
    }
}
