//! Infrastructure layer
//!
//! Concrete persistence backends for the domain repository traits: an
//! in-memory backend for tests and embedding, and a SQLite backend.

pub mod graph;
pub mod review;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Fixed-width RFC 3339 so stored timestamps sort lexically
pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptData(format!("invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn decode_optional_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(decode_time).transpose()
}
