//! Single-flight datastore leases (spec.md §5): "before running, acquire a
//! datastore lease with TTL equal to twice the task's expected runtime...
//! skip the tick if the lease is already held." Grounded on the teacher's
//! `reserve_execution` CAS pattern (`session/repository_sqlx.rs`): an
//! `UPDATE ... WHERE` that only succeeds when the row is actually claimable,
//! with no separate read-then-write race window for the common case of an
//! already-existing lease row.

use chrono::{DateTime, Duration, Utc};
use sqlx::AnyPool;

/// Attempts to claim `task_name` for `holder_id` until `now + ttl`. Returns
/// `true` if the lease was claimed (either a fresh row or an expired one was
/// taken over), `false` if another holder's lease is still live.
///
/// The INSERT fallback for a never-before-seen task name races a concurrent
/// first-acquirer: both can observe "no row" and both attempt to insert.
/// Exactly one INSERT succeeds (the primary key forces that); this is
/// reported here as `false` for the loser rather than retried, since a
/// missed tick is harmless and the next cadence will try again.
pub async fn try_acquire(
    pool: &AnyPool,
    task_name: &str,
    holder_id: &str,
    ttl: Duration,
) -> anyhow::Result<bool> {
    let now = Utc::now();
    let expires_at = now + ttl;

    let res = sqlx::query(
        r#"UPDATE leases SET holder_id = ?, expires_at = ? WHERE task_name = ? AND expires_at < ?;"#,
    )
    .bind(holder_id)
    .bind(to_text(expires_at))
    .bind(task_name)
    .bind(to_text(now))
    .execute(pool)
    .await?;

    if res.rows_affected() == 1 {
        return Ok(true);
    }

    // No row expired under us; either the task has never run before (no
    // row at all) or another holder's lease is still live. Distinguish by
    // trying the insert — it only succeeds in the "never run before" case.
    let insert = sqlx::query(r#"INSERT INTO leases (task_name, holder_id, expires_at) VALUES (?, ?, ?);"#)
        .bind(task_name)
        .bind(holder_id)
        .bind(to_text(expires_at))
        .execute(pool)
        .await;

    Ok(insert.is_ok())
}

/// Releases a held lease early so the next cadence does not have to wait out
/// the full TTL. Only releases if `holder_id` still matches — a lease this
/// caller has already lost to TTL expiry and reacquisition by someone else
/// must not be torn down from under them.
pub async fn release(pool: &AnyPool, task_name: &str, holder_id: &str) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM leases WHERE task_name = ? AND holder_id = ?;"#)
        .bind(task_name)
        .bind(holder_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn to_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
