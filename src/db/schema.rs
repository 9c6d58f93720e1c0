//! Persisted state layout (spec.md §6): portfolios, holdings, grids, orders,
//! alerts, leases. Grounded on the teacher's `db/schema.rs` — one
//! `CREATE TABLE IF NOT EXISTS` per entity plus a handful of indices, run
//! unconditionally at startup via `Db::migrate`. All price/quantity/cash
//! columns are TEXT: `rust_decimal::Decimal` has no single bind
//! representation that is lossless across every `sqlx::Any` backend, so the
//! repository layer round-trips through decimal strings (§9 "Decimal
//! arithmetic" design note).

use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS portfolios (
  portfolio_id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  cash_balance TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS holdings (
  portfolio_id TEXT NOT NULL,
  symbol TEXT NOT NULL,
  quantity TEXT NOT NULL,
  average_cost TEXT NOT NULL,
  PRIMARY KEY (portfolio_id, symbol)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS grids (
  grid_id TEXT PRIMARY KEY,
  portfolio_id TEXT NOT NULL,
  symbol TEXT NOT NULL,
  name TEXT NOT NULL,
  lower_price TEXT NOT NULL,
  upper_price TEXT NOT NULL,
  level_count INTEGER NOT NULL,
  investment_amount TEXT NOT NULL,
  status TEXT NOT NULL,
  strategy_config_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  last_rebalanced_at TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  order_id TEXT PRIMARY KEY,
  grid_id TEXT NOT NULL,
  level_index INTEGER NOT NULL,
  level_price TEXT NOT NULL,
  side TEXT NOT NULL,
  quantity TEXT NOT NULL,
  state TEXT NOT NULL,
  paired_level INTEGER,
  filled_at TEXT,
  filled_price TEXT,
  trigger_price TEXT,
  realised_profit TEXT,
  cancel_reason TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS alerts (
  alert_id TEXT PRIMARY KEY,
  kind_json TEXT NOT NULL,
  dedup_key TEXT NOT NULL,
  severity TEXT NOT NULL,
  created_at TEXT NOT NULL,
  dispatch_attempts INTEGER NOT NULL,
  dispatched_at TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS leases (
  task_name TEXT PRIMARY KEY,
  holder_id TEXT NOT NULL,
  expires_at TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_holdings_portfolio ON holdings(portfolio_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_grids_portfolio ON grids(portfolio_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_grids_status ON grids(status);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_grid ON orders(grid_id);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_grid_state ON orders(grid_id, state);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_alerts_dedup ON alerts(dedup_key);"#)
        .execute(pool)
        .await?;
    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_alerts_dispatched ON alerts(dispatched_at);"#)
        .execute(pool)
        .await?;

    Ok(())
}
