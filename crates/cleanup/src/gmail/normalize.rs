//! Gmail header and date normalization
//!
//! Header names are matched case-insensitively; a missing header reads as
//! an empty string.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use super::api::GmailMessage;

/// Display format for preview rows and stats
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Look up a header value by name (case-insensitive)
pub fn header_value(message: &GmailMessage, name: &str) -> String {
    message
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .and_then(|headers| {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        })
        .unwrap_or_default()
}

/// Parse an RFC 2822 `Date` header, keeping its offset
///
/// Accepts the obsolete forms Gmail passes through, such as a trailing
/// comment (`+0000 (UTC)`) or a named zone (`GMT`).
pub fn parse_header_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    // Drop a trailing "(comment)" and retry
    let without_comment = match raw.rfind('(') {
        Some(idx) if raw.ends_with(')') => raw[..idx].trim_end(),
        _ => return None,
    };
    DateTime::parse_from_rfc2822(without_comment).ok()
}

/// Format a parsed date for display
pub fn format_display_date(date: &DateTime<FixedOffset>) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// Normalize a raw `Date` header for display, keeping the raw string when
/// it cannot be parsed
pub fn display_date(raw: &str) -> String {
    parse_header_date(raw)
        .map(|dt| format_display_date(&dt))
        .unwrap_or_else(|| raw.to_string())
}

/// Resolve when a message was received, in UTC
///
/// Fallback chain: `internalDate` (ms since epoch) → `Date` header → epoch zero.
pub fn received_at(message: &GmailMessage) -> DateTime<Utc> {
    if let Some(millis) = message
        .internal_date
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok())
        && let Some(dt) = Utc.timestamp_millis_opt(millis).single()
    {
        return dt;
    }

    if let Some(dt) = parse_header_date(&header_value(message, "Date")) {
        return dt.with_timezone(&Utc);
    }

    DateTime::<Utc>::UNIX_EPOCH
}
