//! Creation time of an item
//!
//! Long numeric identifiers embed their creation time: the high bits above
//! bit 22 count milliseconds since a fixed platform epoch. Other identifiers
//! carry no time, so the rendered date label next to the permalink is
//! parsed instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Platform epoch, in Unix milliseconds, that identifier times count from
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_288_834_974_657;

/// Bits below the timestamp in an identifier
const TIMESTAMP_SHIFT: u32 = 22;

/// Identifiers this long or shorter never embed a timestamp
const MIN_SNOWFLAKE_DIGITS: usize = 10;

/// Rendered date label, e.g. `3:52 PM · Mar 21, 2018`
const DATE_LABEL_FORMAT: &str = "%I:%M %p \u{b7} %b %d, %Y";

/// Timestamp embedded in an identifier, if it has one
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    if id.len() <= MIN_SNOWFLAKE_DIGITS || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let raw: u64 = id.parse().ok()?;
    let millis = i64::try_from(raw >> TIMESTAMP_SHIFT).ok()? + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(millis).single()
}

/// Parses a rendered date label, taken to be UTC
///
/// Rendered pages separate time and meridiem with non-breaking or narrow
/// spaces; those are folded into plain spaces first.
pub fn parse_date_label(label: &str) -> Option<DateTime<Utc>> {
    let folded: String = label
        .chars()
        .map(|c| match c {
            '\u{a0}' | '\u{202f}' | '\u{2009}' => ' ',
            other => other,
        })
        .collect();
    let normalized = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    NaiveDateTime::parse_from_str(&normalized, DATE_LABEL_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parses a profile's `Joined <Month> <Year>` caption into the month's first day
pub fn parse_joined_caption(caption: &str) -> Option<NaiveDate> {
    let rest = caption.trim().strip_prefix("Joined")?;
    let mut parts = rest.split_whitespace();
    let month = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::parse_from_str(&format!("1 {} {}", month, year), "%d %B %Y").ok()
}
