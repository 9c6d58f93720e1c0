//! HTTP API surface (spec.md §6): grids CRUD, manual transactions, and cash
//! adjustments. Grounded on the pack's `cooprefr-bettersys/rust-backend`
//! axum wiring (`src/api/routes.rs`, `src/main.rs`'s `Router::new()...
//! .with_state(...)` chain) — this crate has no teacher precedent for axum,
//! so the router/handler shape is learned from that example instead.

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the full router. Kept as a free function (not a method on
/// `AppState`) so a binary can compose it with whatever outer middleware it
/// needs before serving.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/grids", post(routes::create_grid).get(routes::list_grids))
        .route("/api/grids/:id", get(routes::get_grid).delete(routes::delete_grid))
        .route("/api/transactions", post(routes::create_transaction))
        .route(
            "/api/portfolios/:id/update-cash",
            post(routes::update_cash),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
