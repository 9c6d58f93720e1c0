use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Process-wide configuration, read once at startup from the environment.
///
/// Mirrors the teacher's `AppConfig::from_env()` style: every field has a
/// documented default and can be overridden by an environment variable.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string (sqlite or postgres DSN).
    pub database_url: String,

    /// Address the HTTP API surface binds to (spec.md §6).
    pub http_bind_addr: String,

    // =========================
    // SMTP / alert dispatch
    // =========================
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    /// Mailbox that receives dispatched alert notifications.
    pub alert_recipient_email: String,

    /// Maximum dispatch attempts before an alert is marked DISPATCH_FAILED.
    ///
    /// Purpose:
    /// - bound retry storms against a flaky SMTP relay
    /// - guarantee every alert eventually reaches a terminal dispatch state
    pub alert_max_dispatch_attempts: u32,

    // =========================
    // Scheduler cadences (spec.md §4.6)
    // =========================
    /// Grid Monitor tick cadence. Default 2 minutes: polling is intentionally
    /// coarse (spec.md §1 non-goals exclude sub-second latency).
    pub monitor_cadence_secs: u64,
    /// Price cache refresh cadence.
    pub price_cache_cadence_secs: u64,
    /// Portfolio revaluation cadence.
    pub portfolio_revaluation_cadence_secs: u64,
    /// Alert dispatcher cadence — short, since dispatch is cheap and alerts
    /// should reach users promptly once persisted.
    pub alert_dispatch_cadence_secs: u64,
    /// DYNAMIC grid rebalance-scan cadence.
    pub rebalance_scan_cadence_secs: u64,

    /// Lease TTL multiplier over a task's expected runtime (spec.md §5):
    /// "datastore leases with TTL equal to twice the task's expected
    /// runtime."
    pub lease_ttl_multiplier: u32,

    // =========================
    // Monitor / alert thresholds
    // =========================
    /// Fraction of price used as the default boundary buffer for
    /// `PRICE_NEAR_BOUNDARY` classification (spec.md §4.4: default 0.5%).
    pub boundary_buffer_fraction: Decimal,
    /// Cumulative-profit milestone steps used by the dedup bucket formula
    /// (spec.md §4.5).
    pub milestone_steps: Vec<Decimal>,
    /// DYNAMIC grid rebalance-drift threshold as a fraction of the grid's
    /// width (spec.md §4.4: default 0.4).
    pub rebalance_threshold_fraction: Decimal,
    /// Minimum re-alert interval for `MARKET_DATA_GAP`, in seconds
    /// (spec.md §4.5: "minimum re-alert interval of 1 hour").
    pub market_data_gap_dedup_secs: u64,

    // =========================
    // Market data / concurrency bounds (spec.md §5)
    // =========================
    pub market_data_call_timeout_secs: u64,
    pub market_data_batch_timeout_secs: u64,
    /// Bounded pool size for parallel per-symbol market-data fetches.
    pub market_data_fetch_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://gridcore_dev.db".to_string());

        let env_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_usize = |key: &str, default: usize| -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            database_url,

            http_bind_addr: std::env::var("HTTP_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),

            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port: env_u64("SMTP_PORT", 587) as u16,
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            smtp_from: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| "alerts@gridcore.local".to_string()),
            alert_recipient_email: std::env::var("ALERT_RECIPIENT_EMAIL")
                .unwrap_or_else(|_| "ops@gridcore.local".to_string()),
            alert_max_dispatch_attempts: env_u64("ALERT_MAX_DISPATCH_ATTEMPTS", 5) as u32,

            monitor_cadence_secs: env_u64("MONITOR_CADENCE_SECS", 120),
            price_cache_cadence_secs: env_u64("PRICE_CACHE_CADENCE_SECS", 300),
            portfolio_revaluation_cadence_secs: env_u64(
                "PORTFOLIO_REVALUATION_CADENCE_SECS",
                600,
            ),
            alert_dispatch_cadence_secs: env_u64("ALERT_DISPATCH_CADENCE_SECS", 30),
            rebalance_scan_cadence_secs: env_u64("REBALANCE_SCAN_CADENCE_SECS", 900),
            lease_ttl_multiplier: 2,

            boundary_buffer_fraction: dec!(0.005),
            milestone_steps: vec![dec!(5000), dec!(15000), dec!(30000)],
            rebalance_threshold_fraction: dec!(0.4),
            market_data_gap_dedup_secs: env_u64("MARKET_DATA_GAP_DEDUP_SECS", 3600),

            market_data_call_timeout_secs: env_u64("MARKET_DATA_CALL_TIMEOUT_SECS", 10),
            market_data_batch_timeout_secs: env_u64("MARKET_DATA_BATCH_TIMEOUT_SECS", 30),
            market_data_fetch_concurrency: env_usize("MARKET_DATA_FETCH_CONCURRENCY", 16),
        }
    }
}
