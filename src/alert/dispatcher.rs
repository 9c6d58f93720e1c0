//! Alert persistence + dispatch worker (spec.md §4.5). Grounded on the
//! teacher's `reserve_execution`/`commit_batch` split: validation/dedup
//! logic lives here as a thin orchestration layer, all durability and
//! concurrency guarantees are delegated to the `AlertStore` port.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::alert::channels::AlertChannel;
use crate::alert::dedup;
use crate::alert::types::{Alert, AlertKind};
use crate::error::AlertError;

#[async_trait::async_trait]
pub trait AlertStore: Send + Sync + 'static {
    /// Most recently created alert sharing `dedup_key`, if any.
    async fn find_recent_by_dedup_key(&self, dedup_key: &str) -> anyhow::Result<Option<Alert>>;

    async fn insert_alert(&self, alert: &Alert) -> anyhow::Result<()>;

    async fn pending_alerts(&self, limit: usize) -> anyhow::Result<Vec<Alert>>;

    async fn mark_dispatched(&self, alert_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn record_dispatch_attempt(&self, alert_id: Uuid) -> anyhow::Result<u32>;
}

/// Dedup-aware front door for raising an alert. Holds the dedup window and
/// wraps an `AlertStore`, the same way the teacher's `SessionStore` wraps a
/// `SessionRepository` — callers (Monitor, Execution) never see the store
/// directly.
#[derive(Clone)]
pub struct AlertSink {
    store: Arc<dyn AlertStore>,
    dedup_window: Duration,
}

impl AlertSink {
    pub fn new(store: Arc<dyn AlertStore>, dedup_window: Duration) -> Self {
        Self {
            store,
            dedup_window,
        }
    }

    /// Raises `kind` unless a recent alert with the same dedup key already
    /// covers it (spec.md §4.5). CRITICAL alerts bypass dedup entirely and
    /// are always dispatched; WARN/INFO respect the window, using the
    /// kind's override if it has one (e.g. `MARKET_DATA_GAP`'s 1-hour
    /// minimum) or the sink's configured default otherwise. Returns the new
    /// alert's id, or `None` if suppressed as a duplicate.
    #[instrument(skip(self, kind))]
    pub async fn raise(&self, kind: AlertKind) -> Result<Option<Uuid>, AlertError> {
        let now = Utc::now();

        if kind.severity() != crate::alert::types::AlertSeverity::Critical {
            let dedup_key = kind.dedup_key();
            let window = kind.dedup_window_override().unwrap_or(self.dedup_window);

            let recent = self
                .store
                .find_recent_by_dedup_key(&dedup_key)
                .await
                .map_err(AlertError::Repository)?;

            if dedup::is_duplicate(recent.as_ref(), now, window) {
                return Ok(None);
            }
        }

        let alert = Alert::new(kind, now);
        let id = alert.id;
        self.store
            .insert_alert(&alert)
            .await
            .map_err(AlertError::Repository)?;

        Ok(Some(id))
    }
}

/// Drains up to `limit` undispatched alerts through `channel`, retrying
/// failed sends up to `max_attempts` times. A channel failure on one alert
/// never blocks the others — each alert's outcome is independent (spec.md
/// §4.5: "DISPATCH_FAILED after exhausting attempts").
#[instrument(skip(store, channel))]
pub async fn dispatch_pending(
    store: &dyn AlertStore,
    channel: &dyn AlertChannel,
    max_attempts: u32,
    limit: usize,
) -> Result<(), AlertError> {
    let pending = store
        .pending_alerts(limit)
        .await
        .map_err(AlertError::Repository)?;

    for alert in pending {
        match channel.send(&alert).await {
            Ok(()) => {
                store
                    .mark_dispatched(alert.id, Utc::now())
                    .await
                    .map_err(AlertError::Repository)?;
            }
            Err(e) => {
                let attempts = store
                    .record_dispatch_attempt(alert.id)
                    .await
                    .map_err(AlertError::Repository)?;
                if attempts >= max_attempts {
                    warn!(alert_id = %alert.id, attempts, error = %e, "alert dispatch exhausted");
                } else {
                    warn!(alert_id = %alert.id, attempts, error = %e, "alert dispatch failed, will retry");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::channels::InMemoryChannel;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryAlertStore {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl AlertStore for InMemoryAlertStore {
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

        async fn pending_alerts(&self, limit: usize) -> anyhow::Result<Vec<Alert>> {
            Ok(self
                .alerts
                .lock()
                .iter()
                .filter(|a| a.dispatched_at.is_none())
                .take(limit)
                .cloned()
                .collect())
        }

        async fn mark_dispatched(&self, alert_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
            let mut guard = self.alerts.lock();
            if let Some(a) = guard.iter_mut().find(|a| a.id == alert_id) {
                a.dispatched_at = Some(at);
            }
            Ok(())
        }

        async fn record_dispatch_attempt(&self, alert_id: Uuid) -> anyhow::Result<u32> {
            let mut guard = self.alerts.lock();
            if let Some(a) = guard.iter_mut().find(|a| a.id == alert_id) {
                a.dispatch_attempts += 1;
                return Ok(a.dispatch_attempts);
            }
            Ok(0)
        }
    }

    fn grid_created(grid_id: Uuid) -> AlertKind {
        AlertKind::GridCreated {
            grid_id,
            symbol: "ACME".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_alert_within_window_is_suppressed() {
        let store: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::default());
        let sink = AlertSink::new(store, Duration::minutes(5));

        let grid_id = Uuid::new_v4();
        let first = sink.raise(grid_created(grid_id)).await.unwrap();
        let second = sink.raise(grid_created(grid_id)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn distinct_grids_are_not_deduped_against_each_other() {
        let store: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::default());
        let sink = AlertSink::new(store, Duration::minutes(5));

        let a = sink.raise(grid_created(Uuid::new_v4())).await.unwrap();
        let b = sink.raise(grid_created(Uuid::new_v4())).await.unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn dispatch_pending_delivers_through_channel_and_marks_dispatched() {
        let store = Arc::new(InMemoryAlertStore::default());
        let sink = AlertSink::new(store.clone(), Duration::minutes(5));
        sink.raise(AlertKind::PriceAboveRange {
            grid_id: Uuid::new_v4(),
            symbol: "ACME".into(),
            price: dec!(1),
            boundary_buffer: dec!(0.01),
        })
        .await
        .unwrap();

        let channel = InMemoryChannel::new();
        dispatch_pending(store.as_ref(), &channel, 3, 10)
            .await
            .unwrap();

        assert_eq!(channel.sent().len(), 1);
        assert_eq!(store.pending_alerts(10).await.unwrap().len(), 0);
    }
}
