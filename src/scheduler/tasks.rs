//! Cadence-driven task loops (spec.md §4.6, §5). Grounded on the teacher's
//! `Scheduler::on_tick` shape — one instrumented tick per interval, bounded
//! and restart-safe — generalized here into a reusable `spawn_task` wrapper
//! so the Monitor, price-cache refresh, portfolio revaluation, alert
//! dispatch, and rebalance scan all share the same lease-guarded loop
//! instead of five hand-rolled copies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::AnyPool;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use super::leases;
use crate::market::Market;

#[derive(Clone, Copy, Debug)]
pub struct ScheduledTask {
    pub name: &'static str,
    pub cadence: StdDuration,
    pub lease_ttl: StdDuration,
}

/// Spawns a cadence-driven background loop for `task`. Each tick: wait for
/// the interval, try to claim the task's lease, run `action` if claimed, and
/// release the lease promptly rather than waiting out the TTL. Missed ticks
/// are skipped rather than coalesced (spec.md §5), matching
/// `MissedTickBehavior::Skip`.
pub fn spawn_task<F, Fut>(
    pool: Arc<AnyPool>,
    task: ScheduledTask,
    holder_id: String,
    action: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(task.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let lease_ttl = ChronoDuration::from_std(task.lease_ttl).unwrap_or_else(|_| ChronoDuration::seconds(60));

        loop {
            interval.tick().await;
            run_once(&pool, &task, &holder_id, lease_ttl, &action).await;
        }
    })
}

#[instrument(skip(pool, action), fields(task = task.name))]
async fn run_once<F, Fut>(
    pool: &AnyPool,
    task: &ScheduledTask,
    holder_id: &str,
    lease_ttl: ChronoDuration,
    action: &F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match leases::try_acquire(pool, task.name, holder_id, lease_ttl).await {
        Ok(true) => {
            if let Err(e) = action().await {
                warn!(error = %e, "scheduled task failed");
            }
            if let Err(e) = leases::release(pool, task.name, holder_id).await {
                warn!(error = %e, "failed to release lease");
            }
        }
        Ok(false) => debug!("lease held elsewhere, skipping tick"),
        Err(e) => warn!(error = %e, "lease acquisition failed"),
    }
}

/// Always-eligible gate for tasks with no market-hours dependency (alert
/// dispatch, portfolio revaluation).
pub fn always() -> bool {
    true
}

/// Gate for tasks that should only run while at least one tracked symbol's
/// market is open (the Grid Monitor tick, spec.md §4.4 step 2).
pub fn any_market_open(symbols: &[String], now: DateTime<Utc>) -> bool {
    symbols.iter().any(|s| Market::classify(s).is_open_at(now))
}
