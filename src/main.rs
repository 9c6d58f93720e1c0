use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use gridcore::alert::{dispatch_pending, AlertSink, InMemoryChannel, SmtpChannel};
use gridcore::config::AppConfig;
use gridcore::db::Db;
use gridcore::http::{self, AppState};
use gridcore::logger::init_tracing;
use gridcore::market::{InMemoryMarketData, PriceCache};
use gridcore::monitor::{Monitor, MonitorConfig};
use gridcore::planner::rebalance::run_rebalance_scan;
use gridcore::portfolio::run_revaluation;
use gridcore::repository::SqlxRepository;
use gridcore::scheduler::{spawn_task, ScheduledTask};
use gridcore::market::MarketDataPort;
use gridcore::repository::GridRepository;

/// Process entrypoint: wires the datastore, every port, the five scheduled
/// tasks (spec.md §4.6), and the HTTP API surface (spec.md §6), then waits
/// for a shutdown signal. Mirrors the teacher's `main.rs` shape — a set of
/// small `start_*` helpers composed in `main`, rather than one monolithic
/// function.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("starting gridcore");

    let cfg = AppConfig::from_env();

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let repo = Arc::new(SqlxRepository::new(db.pool.clone()));

    // No venue/feed connectivity is in scope (spec.md §1 non-goals): the
    // Market Data Port is wired to the in-memory stub here. A real
    // deployment swaps this for a feed-backed `MarketDataPort` impl without
    // touching anything downstream.
    let market_data: Arc<dyn gridcore::market::MarketDataPort> = Arc::new(InMemoryMarketData::new());
    let price_cache = PriceCache::new();

    let alerts = build_alert_sink(repo.clone());
    let alert_channel = build_alert_channel(&cfg);

    let monitor = Arc::new(Monitor::new(
        repo.clone(),
        repo.clone(),
        alerts.clone(),
        price_cache.clone(),
        MonitorConfig {
            rebalance_threshold_fraction: cfg.rebalance_threshold_fraction,
            boundary_buffer_fraction: cfg.boundary_buffer_fraction,
            milestone_steps: cfg.milestone_steps.clone(),
        },
    ));

    let holder_id = uuid::Uuid::new_v4().to_string();
    let lease_ttl = |cadence_secs: u64| {
        StdDuration::from_secs(cadence_secs * cfg.lease_ttl_multiplier as u64)
    };

    spawn_price_cache_refresh(
        db.pool.clone(),
        holder_id.clone(),
        &cfg,
        lease_ttl(cfg.price_cache_cadence_secs),
        repo.clone(),
        market_data.clone(),
        price_cache.clone(),
    );

    spawn_task(
        db.pool.clone(),
        ScheduledTask {
            name: "grid_monitor_tick",
            cadence: StdDuration::from_secs(cfg.monitor_cadence_secs),
            lease_ttl: lease_ttl(cfg.monitor_cadence_secs),
        },
        holder_id.clone(),
        move || {
            let monitor = monitor.clone();
            async move { monitor.run_tick().await.map_err(Into::into) }
        },
    );

    spawn_task(
        db.pool.clone(),
        ScheduledTask {
            name: "portfolio_revaluation",
            cadence: StdDuration::from_secs(cfg.portfolio_revaluation_cadence_secs),
            lease_ttl: lease_ttl(cfg.portfolio_revaluation_cadence_secs),
        },
        holder_id.clone(),
        {
            let repo = repo.clone();
            let market_data = market_data.clone();
            move || {
                let repo = repo.clone();
                let market_data = market_data.clone();
                async move { run_revaluation(repo.as_ref(), market_data.as_ref()).await }
            }
        },
    );

    spawn_task(
        db.pool.clone(),
        ScheduledTask {
            name: "alert_dispatch",
            cadence: StdDuration::from_secs(cfg.alert_dispatch_cadence_secs),
            lease_ttl: lease_ttl(cfg.alert_dispatch_cadence_secs),
        },
        holder_id.clone(),
        {
            let repo = repo.clone();
            let max_attempts = cfg.alert_max_dispatch_attempts;
            move || {
                let repo = repo.clone();
                let channel = alert_channel.clone();
                async move {
                    dispatch_pending(repo.as_ref(), channel.as_ref(), max_attempts, 50)
                        .await
                        .map_err(Into::into)
                }
            }
        },
    );

    spawn_task(
        db.pool.clone(),
        ScheduledTask {
            name: "rebalance_scan",
            cadence: StdDuration::from_secs(cfg.rebalance_scan_cadence_secs),
            lease_ttl: lease_ttl(cfg.rebalance_scan_cadence_secs),
        },
        holder_id.clone(),
        {
            let repo = repo.clone();
            let market_data = market_data.clone();
            let threshold = cfg.rebalance_threshold_fraction;
            move || {
                let repo = repo.clone();
                let market_data = market_data.clone();
                async move { run_rebalance_scan(repo.as_ref(), market_data.as_ref(), threshold).await }
            }
        },
    );

    let state = AppState {
        grids: repo.clone(),
        portfolios: repo.clone(),
        execution: repo.clone(),
        market_data: market_data.clone(),
        alerts,
    };
    let router = http::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.http_bind_addr).await?;
    tracing::info!(addr = %cfg.http_bind_addr, "http api listening");

    tokio::select! {
        res = axum::serve(listener, router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

fn build_alert_sink(repo: Arc<SqlxRepository>) -> AlertSink {
    // spec.md §8 testable property 6: at most one alert per dedup key per
    // 1-hour window is the sink-wide default; individual kinds override it
    // (`AlertKind::dedup_window_override`) where the spec calls for a
    // different grain.
    AlertSink::new(repo, ChronoDuration::hours(1))
}

fn build_alert_channel(cfg: &AppConfig) -> Arc<dyn gridcore::alert::AlertChannel> {
    match (&cfg.smtp_host, &cfg.smtp_user, &cfg.smtp_password) {
        (Some(host), Some(user), Some(password)) => {
            match SmtpChannel::new(host, user, password, cfg.smtp_from.clone(), cfg.alert_recipient_email.clone()) {
                Ok(channel) => Arc::new(channel),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to construct smtp channel, falling back to in-memory");
                    Arc::new(InMemoryChannel::new())
                }
            }
        }
        _ => {
            tracing::warn!("SMTP_HOST/SMTP_USER/SMTP_PASSWORD not fully configured, alerts will not leave the process");
            Arc::new(InMemoryChannel::new())
        }
    }
}

/// Price cache refresh (spec.md §4.6, 5-minute cadence, market-open gate):
/// re-fetches current prices for every symbol with an ACTIVE grid and writes
/// them into the shared read-mostly `PriceCache` the Monitor reads from.
fn spawn_price_cache_refresh(
    pool: Arc<sqlx::AnyPool>,
    holder_id: String,
    cfg: &AppConfig,
    lease_ttl: StdDuration,
    repo: Arc<SqlxRepository>,
    market_data: Arc<dyn gridcore::market::MarketDataPort>,
    price_cache: PriceCache,
) {
    spawn_task(
        pool,
        ScheduledTask {
            name: "price_cache_refresh",
            cadence: StdDuration::from_secs(cfg.price_cache_cadence_secs),
            lease_ttl,
        },
        holder_id,
        move || {
            let repo = repo.clone();
            let market_data = market_data.clone();
            let price_cache = price_cache.clone();
            async move {
                let grids = repo.list_grids(None, None, Some(gridcore::planner::types::GridStatus::Active)).await?;
                let now = chrono::Utc::now();
                let symbols: Vec<String> = grids
                    .iter()
                    .filter(|g| g.market.is_open_at(now))
                    .map(|g| g.symbol.clone())
                    .collect();
                if symbols.is_empty() {
                    return Ok(());
                }
                let prices = market_data.current_prices(&symbols).await?;
                for (symbol, tick) in prices {
                    price_cache.set(&symbol, tick.price, tick.observed_at).await;
                }
                Ok(())
            }
        },
    );
}
