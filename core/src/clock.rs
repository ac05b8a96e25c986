//! Wall-clock timestamps for ledger metadata.
//!
//! RULE: timestamps are bookkeeping only. Derivation and selection never
//! read the clock.
//!
//! Format is fixed-width RFC 3339 UTC with microseconds, so stored values
//! compare correctly as strings.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    format(Utc::now())
}

/// Timestamp `max_age` before now.
pub fn cutoff(max_age: Duration) -> String {
    format(Utc::now() - max_age)
}
