pub mod data_port;
pub mod rules;
pub mod view;

pub use data_port::{Close, InMemoryMarketData, MarketDataPort, PriceTick};
pub use rules::{Market, TradingWindow};
pub use view::PriceCache;
