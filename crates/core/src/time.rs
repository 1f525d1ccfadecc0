use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::errors::{CrmError, CrmResult};

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Source of "now" for derived fields and overdue queries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Converts a caller-supplied ISO-8601 date or date-time to epoch milliseconds.
///
/// Accepts RFC 3339 (`Z` or numeric offset), naive date-times (read as UTC)
/// and bare dates (midnight UTC).
pub fn iso_to_millis(raw: &str) -> CrmResult<i64> {
    let value = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    if let Some(midnight) =
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight).timestamp_millis());
    }

    Err(CrmError::validation(format!("Invalid date format: {raw}")))
}

/// Reads a stored CRM timestamp: epoch milliseconds as text, or RFC 3339.
///
/// Returns `None` for anything else; callers treat that as "no timestamp".
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(millis) = value.parse::<i64>() {
        return Some(millis);
    }
    DateTime::parse_from_rfc3339(value).ok().map(|parsed| parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn iso_conversion_matches_utc_epoch() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap().timestamp_millis();

        assert_eq!(expected, 1_735_689_600_000);
        assert_eq!(iso_to_millis("2025-01-01T00:00:00Z"), Ok(expected));
        assert_eq!(iso_to_millis("2025-01-01T00:00:00+00:00"), Ok(expected));
        assert_eq!(iso_to_millis("2025-01-01T00:00:00"), Ok(expected));
        assert_eq!(iso_to_millis("2025-01-01"), Ok(expected));
        assert_eq!(iso_to_millis("2025-01-01T02:00:00+02:00"), Ok(expected));
    }

    #[test]
    fn iso_conversion_rejects_garbage_as_validation() {
        let error = iso_to_millis("next tuesday").unwrap_err();

        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(error.message.contains("next tuesday"));
        assert!(iso_to_millis("").is_err());
    }

    #[test]
    fn stored_timestamps_accept_millis_and_rfc3339() {
        assert_eq!(parse_timestamp_ms("1735689600000"), Some(1_735_689_600_000));
        assert_eq!(parse_timestamp_ms("2025-01-01T00:00:00.000Z"), Some(1_735_689_600_000));
        assert_eq!(parse_timestamp_ms("soon"), None);
        assert_eq!(parse_timestamp_ms("  "), None);
    }
}
