//! Stored timestamp format shared by both backends.

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 with nanoseconds and `Z`: every value has the same width, so
/// string order is chronological order.
pub fn format(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Re-renders an RFC 3339 string in the stored format, `None` for anything
/// else.
pub fn normalize(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| format(&parsed.with_timezone(&Utc)))
}
