//! Decoding of the `startts` header value.
//!
//! Meters in the field report the start of a profile in a handful of shapes. Naive
//! (zone-less) values are taken as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    // Two-digit years first: `%Y` would also accept "15" as the year 15.
    "%d.%m.%y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

/// Decodes a device timestamp, returning `None` for anything unrecognised
pub fn parse_device_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}
