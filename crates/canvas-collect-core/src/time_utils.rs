//! Slack `seconds.micros` timestamp helpers.

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Parses a Slack timestamp such as `1738745400.123456`; unparsable values map to zero.
pub fn slack_ts_value(ts: &str) -> f64 {
    ts.trim().parse::<f64>().unwrap_or(0.0)
}

/// Numeric ordering of two Slack timestamps.
pub fn compare_slack_ts(left: &str, right: &str) -> Ordering {
    slack_ts_value(left).total_cmp(&slack_ts_value(right))
}

pub fn slack_ts_to_datetime(ts: &str) -> DateTime<Utc> {
    let value = slack_ts_value(ts);
    let seconds = value.trunc() as i64;
    let nanos = ((value.fract() * 1_000_000.0).round() as u32).min(999_999) * 1_000;
    DateTime::from_timestamp(seconds, nanos).unwrap_or_default()
}

/// Returns the Slack timestamp `days` days before `now`, used as an `oldest` bound.
///
/// A window reaching past the Unix epoch (or past chrono's range) has no
/// meaningful lower bound and yields `None`.
pub fn days_ago_to_slack_ts(days: u32, now: DateTime<Utc>) -> Option<String> {
    let window = TimeDelta::try_seconds(i64::from(days).saturating_mul(SECONDS_PER_DAY))?;
    let past = now.checked_sub_signed(window)?;
    if past.timestamp() < 0 {
        return None;
    }
    Some(format!(
        "{}.{:06}",
        past.timestamp(),
        past.timestamp_subsec_micros()
    ))
}

/// `2026-02-05 06:30 (UTC)`
pub fn format_datetime_utc(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M (UTC)").to_string()
}

/// `2026-02-05`
pub fn format_date_only_utc(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// `06:30 (UTC)`
pub fn format_time_utc(value: DateTime<Utc>) -> String {
    value.format("%H:%M (UTC)").to_string()
}
