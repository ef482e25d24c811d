use std::time::{SystemTime, UNIX_EPOCH};

use time::{Date, OffsetDateTime, format_description, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::from_unix_timestamp(0).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339_ms(value: &str) -> Option<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    Some((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Accepts a calendar date (`2026-11-01`) or a full RFC 3339 timestamp.
pub fn is_valid_due_date(value: &str) -> bool {
    if OffsetDateTime::parse(value, &Rfc3339).is_ok() {
        return true;
    }
    format_description::parse("[year]-[month]-[day]")
        .is_ok_and(|format| Date::parse(value, &format).is_ok())
}
