//! Time utilities for rate observations.
//!
//! All timestamps are UTC and persisted as ISO 8601 strings.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Format a timestamp the way it is persisted and used in history identities.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO 8601 timestamp.
///
/// Values without an offset are taken as UTC; older files were written that way.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Age of a timestamp relative to now. Future timestamps have zero age.
pub fn age(ts: &Timestamp) -> std::time::Duration {
    now()
        .signed_duration_since(*ts)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Check whether a timestamp is older than the given time-to-live.
pub fn is_stale(ts: &Timestamp, ttl: std::time::Duration) -> bool {
    age(ts) > ttl
}

/// Serde adapter for [`Timestamp`] fields.
pub mod iso8601 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{format_timestamp, parse_timestamp, Timestamp};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    /// Same as the parent module for `Option<Timestamp>`; `null` maps to `None`.
    pub mod option {
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        use super::super::{format_timestamp, parse_timestamp, Timestamp};

        pub fn serialize<S: Serializer>(
            ts: &Option<Timestamp>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Timestamp>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp {raw:?}"))),
                None => Ok(None),
            }
        }
    }
}
