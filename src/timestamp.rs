//! Timestamp parsing for remote rows.
//!
//! The backend emits ISO-8601 in several shapes depending on which column
//! type and which code path produced the row. Parsing walks an ordered list
//! of formats and the first success wins. When nothing matches the value is
//! reported as unparseable: there is no fallback to "now".

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unparseable timestamp: {raw:?}")]
pub struct TimestampError {
    pub raw: String,
}

/// One attempt in the parser chain.
#[derive(Debug, Clone, Copy)]
enum Attempt {
    /// RFC 3339 (`T` separator, `Z` or `+hh:mm`, optional fraction)
    Rfc3339,
    /// Explicit offset format, parsed with [`DateTime::parse_from_str`]
    Offset(&'static str),
    /// No offset, interpreted as UTC
    Naive(&'static str),
    /// Date only, midnight UTC
    Date(&'static str),
}

const CHAIN: &[Attempt] = &[
    Attempt::Rfc3339,
    Attempt::Offset("%Y-%m-%dT%H:%M:%S%.f%#z"),
    Attempt::Offset("%Y-%m-%d %H:%M:%S%.f%#z"),
    Attempt::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    Attempt::Naive("%Y-%m-%dT%H:%M:%S"),
    Attempt::Naive("%Y-%m-%d %H:%M:%S%.f"),
    Attempt::Naive("%Y-%m-%d %H:%M:%S"),
    Attempt::Date("%Y-%m-%d"),
];

impl Attempt {
    fn parse(self, raw: &str) -> Option<DateTime<Utc>> {
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Offset(fmt) => DateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Naive(fmt) => NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|ndt| ndt.and_utc()),
            Self::Date(fmt) => NaiveDate::parse_from_str(raw, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc()),
        }
    }
}

/// Parse a backend timestamp. First matching format wins.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();
    CHAIN
        .iter()
        .find_map(|attempt| attempt.parse(trimmed))
        .ok_or_else(|| TimestampError { raw: raw.to_string() })
}

/// Canonical wire form: RFC 3339, millisecond precision, `Z` suffix.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for required timestamps.
pub mod iso {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for nullable timestamps.
pub mod iso_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
