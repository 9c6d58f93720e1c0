//! Shared application state handed to every handler (spec.md §6). Grounded
//! on the pack's `cooprefr-bettersys::AppState`: one `Clone` struct of
//! `Arc`-wrapped ports passed through `axum::extract::State`.

use std::sync::Arc;

use crate::alert::AlertSink;
use crate::execution::ExecutionStore;
use crate::market::MarketDataPort;
use crate::portfolio::PortfolioRepository;
use crate::repository::GridRepository;

#[derive(Clone)]
pub struct AppState {
    pub grids: Arc<dyn GridRepository>,
    pub portfolios: Arc<dyn PortfolioRepository>,
    pub execution: Arc<dyn ExecutionStore>,
    pub market_data: Arc<dyn MarketDataPort>,
    pub alerts: AlertSink,
}
