//! Grid Monitor tick (spec.md §4.4). Grounded on the teacher's
//! `Scheduler::on_tick` shape — one `#[instrument]`ed entry point per tick,
//! counters for empty/skip outcomes, a bounded amount of work per call — but
//! driving order-trigger evaluation across all ACTIVE grids instead of a
//! single trading pair.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::alert::{AlertKind, AlertSink};
use crate::error::MonitorError;
use crate::execution::{process_fill, ExecutionStore, FillObservation};
use crate::market::{Market, MarketDataPort, PriceCache};
use crate::planner::dynamic;
use crate::planner::types::{Grid, GridStatus, Order, OrderSide, OrderState, StrategyConfig};

#[async_trait::async_trait]
pub trait MonitorStore: Send + Sync + 'static {
    /// Every ACTIVE grid together with its currently PENDING orders.
    async fn active_grids_with_orders(&self) -> anyhow::Result<Vec<(Grid, Vec<Order>)>>;
}

pub struct MonitorConfig {
    pub rebalance_threshold_fraction: Decimal,
    /// Fraction of price used as the boundary buffer for `PRICE_NEAR_BOUNDARY`
    /// classification (spec.md §4.4 step 3c, default 0.5%).
    pub boundary_buffer_fraction: Decimal,
    /// Cumulative-profit milestone steps (spec.md §4.5).
    pub milestone_steps: Vec<Decimal>,
}

pub struct Monitor {
    store: Arc<dyn MonitorStore>,
    execution: Arc<dyn ExecutionStore>,
    alerts: AlertSink,
    price_cache: PriceCache,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        execution: Arc<dyn ExecutionStore>,
        alerts: AlertSink,
        price_cache: PriceCache,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            execution,
            alerts,
            price_cache,
            config,
        }
    }

    /// Runs one monitor tick against the current wall clock. Thin wrapper
    /// around [`Monitor::run_tick_at`] for callers (the scheduler) that have
    /// no reason to inject a clock; tests should call `run_tick_at` directly
    /// with a fixed instant so market-hours gating doesn't depend on when the
    /// test happens to run (spec.md §8 — scenarios are deterministic given a
    /// price trajectory, not given a wall-clock instant).
    pub async fn run_tick(&self) -> Result<(), MonitorError> {
        self.run_tick_at(Utc::now()).await
    }

    /// Runs one monitor tick as of `now`: loads ACTIVE grids in markets open
    /// at `now`, reads each symbol's cached price, evaluates every PENDING
    /// order's trigger, submits crossed BUY orders walking down from the
    /// highest triggered level and crossed SELL orders walking up from the
    /// lowest (spec.md §4.4 step 3b — each side works outward from the
    /// current price first, so a multi-level move fills the levels closest
    /// to the market before the ones further out), classifies out-of-bounds
    /// price moves, and evaluates DYNAMIC rebalance drift (spec.md §4.4
    /// steps 1-4).
    #[instrument(skip(self))]
    pub async fn run_tick_at(&self, now: chrono::DateTime<Utc>) -> Result<(), MonitorError> {
        let grids = self
            .store
            .active_grids_with_orders()
            .await
            .map_err(MonitorError::Repository)?;

        if grids.is_empty() {
            debug!("no active grids");
            return Ok(());
        }

        let symbols: Vec<String> = grids.iter().map(|(g, _)| g.symbol.clone()).collect();
        let prices = self.price_cache.get_many(&symbols).await;

        for (grid, orders) in &grids {
            if grid.status != GridStatus::Active {
                continue;
            }

            let market = Market::classify(&grid.symbol);
            if !market.is_open_at(now) {
                continue;
            }

            let Some(cached) = prices.get(&grid.symbol) else {
                debug!(symbol = %grid.symbol, "no cached price available, skipping grid this tick");
                let _ = self
                    .alerts
                    .raise(AlertKind::MarketDataGap {
                        symbol: grid.symbol.clone(),
                    })
                    .await;
                continue;
            };
            let price = cached.price;

            self.classify_boundary(grid, price).await;
            self.evaluate_rebalance(grid, price).await;
            self.submit_triggered_orders(orders, price, cached.observed_at).await;
        }

        Ok(())
    }

    async fn submit_triggered_orders(
        &self,
        orders: &[Order],
        price: Decimal,
        observed_at: chrono::DateTime<Utc>,
    ) {
        let mut buys: Vec<&Order> = Vec::new();
        let mut sells: Vec<&Order> = Vec::new();
        for o in orders {
            if o.state == OrderState::Pending && o.triggers_at(price) {
                match o.side {
                    OrderSide::Buy => buys.push(o),
                    OrderSide::Sell => sells.push(o),
                }
            }
        }
        // BUYs trigger on a falling price, so the highest level is the one
        // closest to the market and fills first; SELLs trigger on a rising
        // price, so the lowest level fills first.
        buys.sort_by(|a, b| b.level_index.cmp(&a.level_index));
        sells.sort_by_key(|o| o.level_index);
        let triggered = buys.into_iter().chain(sells);

        for order in triggered {
            let observation = FillObservation {
                order_id: order.id,
                observed_price: price,
                observed_at,
            };

            // Alerting for the outcome (ORDER_FILLED, INSUFFICIENT_CASH/
            // HOLDING, PROFIT_MILESTONE, GRID_COMPLETED) is published inside
            // `process_fill` itself (spec.md §4.3 step 5); the Monitor only
            // needs to log failures here.
            if let Err(e) = process_fill(
                self.execution.as_ref(),
                &self.alerts,
                &self.config.milestone_steps,
                observation,
            )
            .await
            {
                warn!(order_id = %order.id, error = %e, "order transition failed");
            }
        }
    }

    /// Classifies the current price against the grid's range (spec.md §4.4
    /// step 3c): above/below the range is a WARN, within `boundary_buffer` of
    /// either bound is an INFO heads-up. A price can be both above range and
    /// "near" the upper bound is impossible by construction — the branches
    /// below are mutually exclusive.
    async fn classify_boundary(&self, grid: &Grid, price: Decimal) {
        let boundary_buffer = self.config.boundary_buffer_fraction * price;

        if price > grid.upper_price {
            let _ = self
                .alerts
                .raise(AlertKind::PriceAboveRange {
                    grid_id: grid.id,
                    symbol: grid.symbol.clone(),
                    price,
                    boundary_buffer,
                })
                .await;
        } else if price < grid.lower_price {
            let _ = self
                .alerts
                .raise(AlertKind::PriceBelowRange {
                    grid_id: grid.id,
                    symbol: grid.symbol.clone(),
                    price,
                    boundary_buffer,
                })
                .await;
        } else if (grid.upper_price - price) <= boundary_buffer
            || (price - grid.lower_price) <= boundary_buffer
        {
            let _ = self
                .alerts
                .raise(AlertKind::PriceNearBoundary {
                    grid_id: grid.id,
                    symbol: grid.symbol.clone(),
                    price,
                    boundary_buffer,
                })
                .await;
        }
    }

    async fn evaluate_rebalance(&self, grid: &Grid, price: Decimal) {
        if !matches!(grid.strategy_config, StrategyConfig::Dynamic { .. }) {
            return;
        }
        if dynamic::should_rebalance(grid, price, self.config.rebalance_threshold_fraction) {
            let StrategyConfig::Dynamic { center_price, .. } = grid.strategy_config else {
                return;
            };
            let _ = self
                .alerts
                .raise(AlertKind::RebalanceSuggested {
                    grid_id: grid.id,
                    symbol: grid.symbol.clone(),
                    current_price: price,
                    center_price,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Alert, AlertStore};
    use crate::execution::TransitionResult;
    use crate::planner::types::{GridStatus, OrderSide};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// A fixed Monday mid-session instant (2026-07-27, 10:00 America/New_York
    /// == 14:00 UTC) so ACME (US-market) tests don't depend on the wall clock
    /// at the moment the test suite happens to run.
    fn open_market_instant() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, 14, 0, 0).unwrap()
    }

    struct FixtureMonitorStore {
        grids: Vec<(Grid, Vec<Order>)>,
    }

    #[async_trait::async_trait]
    impl MonitorStore for FixtureMonitorStore {
        async fn active_grids_with_orders(&self) -> anyhow::Result<Vec<(Grid, Vec<Order>)>> {
            Ok(self.grids.clone())
        }
    }

    #[derive(Default)]
    struct FixtureExecutionStore {
        orders: Mutex<HashMap<Uuid, (Grid, Order, Decimal, Decimal)>>,
        commits: Mutex<Vec<TransitionResult>>,
        cumulative_profit: Mutex<Decimal>,
        pending_count: Mutex<u64>,
        completed: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl ExecutionStore for FixtureExecutionStore {
        async fn load_for_transition(
            &self,
            order_id: Uuid,
        ) -> anyhow::Result<Option<(Grid, Order, Decimal, Decimal)>> {
            Ok(self.orders.lock().get(&order_id).cloned())
        }

        async fn commit_transition(&self, result: &TransitionResult) -> anyhow::Result<()> {
            self.commits.lock().push(result.clone());
            Ok(())
        }

        async fn cumulative_realised_profit(&self, _grid_id: Uuid) -> anyhow::Result<Decimal> {
            Ok(*self.cumulative_profit.lock())
        }

        async fn remaining_pending_count(&self, _grid_id: Uuid) -> anyhow::Result<u64> {
            Ok(*self.pending_count.lock())
        }

        async fn mark_grid_completed(&self, _grid_id: Uuid) -> anyhow::Result<()> {
            *self.completed.lock() = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FixtureAlertStore {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl AlertStore for FixtureAlertStore {
        async fn find_recent_by_dedup_key(&self, dedup_key: &str) -> anyhow::Result<Option<Alert>> {
            Ok(self
                .alerts
                .lock()
                .iter()
                .filter(|a| a.dedup_key == dedup_key)
                .max_by_key(|a| a.created_at)
                .cloned())
        }
        async fn insert_alert(&self, alert: &Alert) -> anyhow::Result<()> {
            self.alerts.lock().push(alert.clone());
            Ok(())
        }
        async fn pending_alerts(&self, _limit: usize) -> anyhow::Result<Vec<Alert>> {
            Ok(vec![])
        }
        async fn mark_dispatched(&self, _alert_id: Uuid, _at: chrono::DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn record_dispatch_attempt(&self, _alert_id: Uuid) -> anyhow::Result<u32> {
            Ok(0)
        }
    }

    fn test_grid(lower: Decimal, upper: Decimal, symbol: &str) -> Grid {
        Grid {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            name: "test".into(),
            lower_price: lower,
            upper_price: upper,
            level_count: 10,
            investment_amount: dec!(10000),
            status: GridStatus::Active,
            strategy_config: crate::planner::types::StrategyConfig::Static,
            created_at: Utc::now(),
            last_rebalanced_at: None,
            market: Market::Us,
        }
    }

    fn default_config() -> MonitorConfig {
        MonitorConfig {
            rebalance_threshold_fraction: dec!(0.4),
            boundary_buffer_fraction: dec!(0.005),
            milestone_steps: vec![dec!(5000), dec!(15000), dec!(30000)],
        }
    }

    #[tokio::test]
    async fn triggered_order_fills_and_raises_order_filled_alert() {
        let grid = test_grid(dec!(90), dec!(110), "ACME");
        let order = Order::new_pending(grid.id, 4, dec!(98), OrderSide::Buy, dec!(10), None);

        let exec_store = Arc::new(FixtureExecutionStore::default());
        exec_store
            .orders
            .lock()
            .insert(order.id, (grid.clone(), order.clone(), dec!(100000), dec!(0)));
        *exec_store.pending_count.lock() = 5;

        let monitor_store = Arc::new(FixtureMonitorStore {
            grids: vec![(grid.clone(), vec![order])],
        });

        let alert_store: Arc<dyn AlertStore> = Arc::new(FixtureAlertStore::default());
        let alerts = AlertSink::new(alert_store.clone(), chrono::Duration::minutes(5));

        let price_cache = PriceCache::new();
        price_cache.set("ACME", dec!(97), Utc::now()).await;

        let monitor = Monitor::new(
            monitor_store,
            exec_store.clone(),
            alerts,
            price_cache,
            default_config(),
        );

        monitor.run_tick_at(open_market_instant()).await.unwrap();

        assert_eq!(exec_store.commits.lock().len(), 1);
        let alerts = alert_store.alerts.lock();
        assert!(alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::OrderFilled { .. })));
    }

    #[tokio::test]
    async fn multi_level_drop_fills_buys_from_highest_level_down() {
        let grid = test_grid(dec!(90), dec!(110), "ACME");
        let near = Order::new_pending(grid.id, 6, dec!(102), OrderSide::Buy, dec!(10), None);
        let far = Order::new_pending(grid.id, 3, dec!(96), OrderSide::Buy, dec!(10), None);

        let exec_store = Arc::new(FixtureExecutionStore::default());
        for o in [&near, &far] {
            exec_store
                .orders
                .lock()
                .insert(o.id, (grid.clone(), o.clone(), dec!(1_000_000), dec!(0)));
        }
        *exec_store.pending_count.lock() = 5;

        let monitor_store = Arc::new(FixtureMonitorStore {
            // Insertion order is bottom-up; the fix must still fill
            // highest-level-first regardless of input order.
            grids: vec![(grid.clone(), vec![far.clone(), near.clone()])],
        });

        let alert_store: Arc<dyn AlertStore> = Arc::new(FixtureAlertStore::default());
        let alerts = AlertSink::new(alert_store.clone(), chrono::Duration::minutes(5));

        let price_cache = PriceCache::new();
        price_cache.set("ACME", dec!(95), Utc::now()).await;

        let monitor = Monitor::new(
            monitor_store,
            exec_store.clone(),
            alerts,
            price_cache,
            default_config(),
        );

        monitor.run_tick_at(open_market_instant()).await.unwrap();

        let commits = exec_store.commits.lock();
        assert_eq!(commits.len(), 2);
        let first_order_id = match &commits[0] {
            TransitionResult::Filled { fill, .. } => fill.order_id,
            TransitionResult::Cancelled { order_id, .. } => *order_id,
        };
        assert_eq!(first_order_id, near.id);
    }

    #[tokio::test]
    async fn price_above_range_raises_warn_alert() {
        let grid = test_grid(dec!(90), dec!(110), "ACME");

        let monitor_store = Arc::new(FixtureMonitorStore {
            grids: vec![(grid.clone(), vec![])],
        });
        let exec_store = Arc::new(FixtureExecutionStore::default());

        let alert_store = Arc::new(FixtureAlertStore::default());
        let alerts = AlertSink::new(alert_store.clone(), chrono::Duration::minutes(5));

        let price_cache = PriceCache::new();
        price_cache.set("ACME", dec!(150), Utc::now()).await;

        let monitor = Monitor::new(
            monitor_store,
            exec_store,
            alerts,
            price_cache,
            default_config(),
        );

        monitor.run_tick_at(open_market_instant()).await.unwrap();

        let alerts = alert_store.alerts.lock();
        assert!(alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::PriceAboveRange { .. })));
    }

    #[tokio::test]
    async fn price_near_upper_boundary_raises_info_alert() {
        let grid = test_grid(dec!(90), dec!(110), "ACME");

        let monitor_store = Arc::new(FixtureMonitorStore {
            grids: vec![(grid.clone(), vec![])],
        });
        let exec_store = Arc::new(FixtureExecutionStore::default());

        let alert_store = Arc::new(FixtureAlertStore::default());
        let alerts = AlertSink::new(alert_store.clone(), chrono::Duration::minutes(5));

        let price_cache = PriceCache::new();
        // 109.8 is within 0.5% of 110 (buffer ~= 0.549), but not above range.
        price_cache.set("ACME", dec!(109.8), Utc::now()).await;

        let monitor = Monitor::new(
            monitor_store,
            exec_store,
            alerts,
            price_cache,
            default_config(),
        );

        monitor.run_tick_at(open_market_instant()).await.unwrap();

        let alerts = alert_store.alerts.lock();
        assert!(alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::PriceNearBoundary { .. })));
        assert!(!alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::PriceAboveRange { .. })));
    }

    #[tokio::test]
    async fn grid_with_no_cached_price_raises_market_data_gap() {
        let grid = test_grid(dec!(90), dec!(110), "NOQUOTE");
        let monitor_store = Arc::new(FixtureMonitorStore {
            grids: vec![(grid, vec![])],
        });
        let exec_store = Arc::new(FixtureExecutionStore::default());
        let alert_store: Arc<dyn AlertStore> = Arc::new(FixtureAlertStore::default());
        let alerts = AlertSink::new(alert_store.clone(), chrono::Duration::minutes(5));

        let monitor = Monitor::new(
            monitor_store,
            exec_store,
            alerts,
            PriceCache::new(),
            default_config(),
        );

        monitor.run_tick_at(open_market_instant()).await.unwrap();

        let alerts = alert_store.alerts.lock();
        assert!(alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::MarketDataGap { .. })));
    }
}
