//! Dedup window evaluation (spec.md §4.5): a candidate alert is suppressed
//! if the most recent alert sharing its `dedup_key` was raised inside the
//! configured window.

use chrono::{DateTime, Utc};

use crate::alert::types::Alert;

/// `true` if `candidate_created_at` falls within `window` of
/// `last_same_key.created_at`, i.e. the candidate should be suppressed.
pub fn is_duplicate(
    last_same_key: Option<&Alert>,
    candidate_created_at: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    match last_same_key {
        Some(prior) => candidate_created_at - prior.created_at < window,
        None => false,
    }
}
