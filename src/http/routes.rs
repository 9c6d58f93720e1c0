//! Handlers for the HTTP API surface (spec.md §6). Grounded on the pack's
//! `cooprefr-bettersys/rust-backend/src/api/routes.rs`: plain async fns
//! taking `State<AppState>` plus `Query`/`Json` extractors, returning
//! `Result<Json<T>, ApiError>`.

use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::http::dto::*;
use crate::http::error::ApiError;
use crate::http::state::AppState;
use crate::planner::sizing::{self, BoundsRequest, PlanRequest};
use crate::planner::types::GridStatus;

/// `POST /api/grids` (spec.md §6): validates and lays out a new grid's
/// ladder via the Grid Planner, persists it, and raises `GRID_CREATED`.
pub async fn create_grid(
    State(state): State<AppState>,
    Json(req): Json<CreateGridRequest>,
) -> Result<Json<CreateGridResponse>, ApiError> {
    let bounds = match req.strategy_config {
        Some(StrategyConfigRequest::Dynamic {
            multiplier,
            lookback_days,
        }) => BoundsRequest::Dynamic {
            multiplier,
            lookback_days,
            allow_fallback: true,
        },
        Some(StrategyConfigRequest::Static) | None => {
            let lower = req.lower_price.ok_or_else(|| ApiError::from(
                crate::error::PlannerError::InvalidBounds {
                    lower: "missing".into(),
                    upper: "missing".into(),
                },
            ))?;
            let upper = req.upper_price.ok_or_else(|| ApiError::from(
                crate::error::PlannerError::InvalidBounds {
                    lower: "missing".into(),
                    upper: "missing".into(),
                },
            ))?;
            BoundsRequest::Static { lower, upper }
        }
    };

    let plan_request = PlanRequest {
        portfolio_id: req.portfolio_id,
        symbol: req.symbol,
        name: req.name,
        level_count: req.grid_count,
        investment_amount: req.investment_amount,
        bounds,
    };

    let (grid, orders) = sizing::plan_grid(state.market_data.as_ref(), plan_request).await?;

    state.grids.insert_grid(&grid, &orders).await?;

    let _ = state
        .alerts
        .raise(crate::alert::AlertKind::GridCreated {
            grid_id: grid.id,
            symbol: grid.symbol.clone(),
        })
        .await;

    Ok(Json(CreateGridResponse { grid_id: grid.id }))
}

/// `GET /api/grids?portfolio_id&symbol&status` (spec.md §6): one summary row
/// per matching grid, with current price and running P&L looked up
/// alongside the stored grid fields.
pub async fn list_grids(
    State(state): State<AppState>,
    Query(q): Query<ListGridsQuery>,
) -> Result<Json<Vec<GridSummary>>, ApiError> {
    let status: Option<GridStatus> = q.status.map(GridStatus::from);
    let grids = state
        .grids
        .list_grids(q.portfolio_id, q.symbol.as_deref(), status)
        .await?;

    let symbols: Vec<String> = grids.iter().map(|g| g.symbol.clone()).collect();
    let prices = state
        .market_data
        .current_prices(&symbols)
        .await
        .unwrap_or_default();

    let mut out = Vec::with_capacity(grids.len());
    for grid in grids {
        let cumulative_realised_profit = state
            .execution
            .cumulative_realised_profit(grid.id)
            .await
            .unwrap_or(Decimal::ZERO);
        let orders = state.grids.fetch_orders(grid.id).await.unwrap_or_default();
        let pending_order_count = orders
            .iter()
            .filter(|o| o.state == crate::planner::types::OrderState::Pending)
            .count() as u64;

        out.push(GridSummary {
            id: grid.id,
            portfolio_id: grid.portfolio_id,
            symbol: grid.symbol.clone(),
            name: grid.name.clone(),
            status: grid.status,
            lower_price: grid.lower_price,
            upper_price: grid.upper_price,
            level_count: grid.level_count,
            investment_amount: grid.investment_amount,
            current_price: prices.get(&grid.symbol).map(|t| t.price),
            cumulative_realised_profit,
            pending_order_count,
            created_at: grid.created_at,
        });
    }

    Ok(Json(out))
}

/// `GET /api/grids/{id}` (spec.md §6): full grid detail including the
/// current order ladder.
pub async fn get_grid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GridDetail>, ApiError> {
    let grid = state
        .grids
        .fetch_grid(id)
        .await?
        .ok_or_else(|| ApiError::not_found("grid"))?;
    let orders = state.grids.fetch_orders(id).await?;

    Ok(Json(GridDetail::new(&grid, &orders)))
}

/// `DELETE /api/grids/{id}` (spec.md §6): cancels the grid and every PENDING
/// order; holdings already accumulated are left untouched.
pub async fn delete_grid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .grids
        .fetch_grid(id)
        .await?
        .ok_or_else(|| ApiError::not_found("grid"))?;

    state.grids.cancel_grid(id).await?;

    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// `POST /api/transactions` (spec.md §6): applies a manual fill outside any
/// grid's ladder, `source = MANUAL`. Mutates the portfolio's cash/holding
/// the same way a grid fill would but raises no grid alert.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    state
        .portfolios
        .fetch(req.portfolio_id)
        .await?
        .ok_or_else(|| ApiError::not_found("portfolio"))?;

    state
        .portfolios
        .apply_manual_transaction(
            req.portfolio_id,
            &req.symbol,
            req.transaction_type.into(),
            req.quantity,
            req.price,
            req.fees.unwrap_or(Decimal::ZERO),
        )
        .await?;

    Ok(Json(TransactionResponse { applied: true }))
}

/// `POST /api/portfolios/{id}/update-cash` (spec.md §6): audit-tracked cash
/// override, bypassing the Execution Engine entirely; emits no grid alert.
pub async fn update_cash(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCashRequest>,
) -> Result<Json<UpdateCashResponse>, ApiError> {
    state
        .portfolios
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::not_found("portfolio"))?;

    state.portfolios.set_cash_balance(id, req.new_cash_balance).await?;

    Ok(Json(UpdateCashResponse {
        portfolio_id: id,
        cash_balance: req.new_cash_balance,
    }))
}
