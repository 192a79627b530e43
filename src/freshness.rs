use chrono::{DateTime, Utc};
use std::time::Duration;

/// Milliseconds in one calendar day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Default number of days a completed quiz stays fresh.
pub const DEFAULT_FRESH_DAYS: i64 = 14;

/// FreshnessPolicy
///
/// How long quiz answers stay valid and how long the gate waits on the
/// Profile Store before giving up on a freshness lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub window_days: i64,
    pub fetch_timeout: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_FRESH_DAYS,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl FreshnessPolicy {
    pub fn is_fresh(&self, completed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        completed_at.is_some_and(|at| is_fresh(at, now, self.window_days))
    }
}

/// is_fresh
///
/// `(now - completed_at) / 1 day <= window_days`, compared in exact
/// milliseconds so that exactly `window_days` is still fresh and anything
/// past it is not. A completion stamped in the future counts as fresh.
pub fn is_fresh(completed_at: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> bool {
    let elapsed_ms = now.timestamp_millis() - completed_at.timestamp_millis();
    elapsed_ms <= window_days.saturating_mul(MS_PER_DAY)
}
