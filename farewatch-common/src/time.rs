//! Timestamp utilities
//!
//! All timestamps cross the database boundary as RFC 3339 TEXT. UTC
//! instants are always written with the `Z` suffix so that string
//! comparison orders them correctly; airport-local timestamps keep
//! their UTC offset.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC instant for storage (`2025-07-04T16:00:00Z`)
pub fn utc_to_db(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format an airport-local timestamp for storage (`2025-07-04T18:00:00+02:00`)
pub fn local_to_db(dt: DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse a stored UTC instant
pub fn parse_utc(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("invalid RFC 3339 timestamp '{}': {}", s, e)))
}

/// Parse a stored airport-local timestamp, keeping its offset
pub fn parse_local(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| Error::InvalidInput(format!("invalid RFC 3339 timestamp '{}': {}", s, e)))
}

/// Notification date format: `Fri 04 Jul`
pub fn short_date(dt: DateTime<FixedOffset>) -> String {
    dt.format("%a %d %b").to_string()
}

/// Digest date format: `04/07`
pub fn compact_date(dt: DateTime<FixedOffset>) -> String {
    dt.format("%d/%m").to_string()
}
