use chrono::Utc;

/// Milliseconds since the Unix epoch, used for lease expiry, cooldowns and
/// tick timestamps throughout the core.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
