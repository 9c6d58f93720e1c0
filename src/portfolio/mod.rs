pub mod model;
pub mod revalue;

pub use model::{Holding, Portfolio, PortfolioRepository};
pub use revalue::run_revaluation;
