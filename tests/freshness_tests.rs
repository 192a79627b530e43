use chrono::{Duration, TimeZone, Utc};
use ezcare_gate::freshness::{DEFAULT_FRESH_DAYS, FreshnessPolicy, is_fresh};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
}

#[test]
fn test_completed_13_days_23_hours_ago_is_fresh() {
    let completed = now() - Duration::days(13) - Duration::hours(23);
    assert!(is_fresh(completed, now(), DEFAULT_FRESH_DAYS));
}

#[test]
fn test_completed_14_days_1_minute_ago_is_not_fresh() {
    let completed = now() - Duration::days(14) - Duration::minutes(1);
    assert!(!is_fresh(completed, now(), DEFAULT_FRESH_DAYS));
}

#[test]
fn test_exactly_14_days_is_fresh() {
    let completed = now() - Duration::days(14);
    assert!(is_fresh(completed, now(), DEFAULT_FRESH_DAYS));
}

#[test]
fn test_one_millisecond_past_the_window_is_not_fresh() {
    let completed = now() - Duration::days(14) - Duration::milliseconds(1);
    assert!(!is_fresh(completed, now(), DEFAULT_FRESH_DAYS));
}

#[test]
fn test_completion_in_the_future_counts_as_fresh() {
    let completed = now() + Duration::hours(2);
    assert!(is_fresh(completed, now(), DEFAULT_FRESH_DAYS));
}

#[test]
fn test_policy_treats_missing_completion_as_not_fresh() {
    let policy = FreshnessPolicy::default();
    assert_eq!(policy.window_days, 14);
    assert!(!policy.is_fresh(None, now()));
    assert!(policy.is_fresh(Some(now() - Duration::days(5)), now()));
}

#[test]
fn test_policy_honours_a_custom_window() {
    let policy = FreshnessPolicy {
        window_days: 7,
        ..FreshnessPolicy::default()
    };
    assert!(policy.is_fresh(Some(now() - Duration::days(7)), now()));
    assert!(!policy.is_fresh(Some(now() - Duration::days(8)), now()));
}
