//! Canonical instant type for backend dates.
//!
//! The hosted backend has handed order dates to clients in several shapes
//! over time: an RFC 3339 string, a `{seconds, nanos}` timestamp object, or
//! a raw epoch number. [`Timestamp`] normalizes every one of them into a
//! single `chrono` instant at the deserialization boundary; nothing deeper
//! in the system branches on representation.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single point in time, UTC, normalized from any backend representation.
///
/// Serializes as an RFC 3339 string; deserializes from:
/// - RFC 3339 strings (`"2024-05-01T12:30:00Z"`)
/// - timestamp objects (`{"seconds": 1714566600, "nanos": 0}`, including
///   the `_seconds`/`_nanoseconds` field spelling)
/// - raw epoch numbers: integers and floats are taken as seconds; integer
///   values at or above [`Self::MILLIS_CUTOFF`] are taken as milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Epoch values at or above this are milliseconds, not seconds.
    /// (`1e11` seconds is the year 5138.)
    pub const MILLIS_CUTOFF: i64 = 100_000_000_000;

    /// The current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// The underlying UTC datetime.
    #[must_use]
    pub const fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Build a timestamp from epoch seconds and a nanosecond remainder.
    ///
    /// Returns `None` if the value is outside the representable range.
    #[must_use]
    pub fn from_epoch(seconds: i64, nanos: u32) -> Option<Self> {
        Utc.timestamp_opt(seconds, nanos).single().map(Self)
    }

    /// Milliseconds since the Unix epoch; useful for blob path stamps.
    #[must_use]
    pub const fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

/// The representations observed on the wire, tried in order.
#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Object {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "nanoseconds", alias = "_nanoseconds")]
        nanos: u32,
    },
    Text(String),
    Integer(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let instant = match Wire::deserialize(deserializer)? {
            Wire::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid RFC 3339 date {s:?}: {e}")))?,
            Wire::Object { seconds, nanos } => Utc
                .timestamp_opt(seconds, nanos)
                .single()
                .ok_or_else(|| D::Error::custom(format!("epoch out of range: {seconds}s")))?,
            Wire::Integer(n) => {
                let (seconds, nanos) = if n.abs() >= Self::MILLIS_CUTOFF {
                    (n.div_euclid(1000), u32::try_from(n.rem_euclid(1000)).unwrap_or(0) * 1_000_000)
                } else {
                    (n, 0)
                };
                Utc.timestamp_opt(seconds, nanos)
                    .single()
                    .ok_or_else(|| D::Error::custom(format!("epoch out of range: {n}")))?
            }
            Wire::Float(f) => {
                if !f.is_finite() {
                    return Err(D::Error::custom("epoch must be finite"));
                }
                #[allow(clippy::cast_possible_truncation)]
                let millis = (f * 1000.0) as i64;
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| D::Error::custom(format!("epoch out of range: {f}")))?
            }
        };
        Ok(Self(instant))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn test_rfc3339_string() {
        let t = ts("\"2024-05-01T12:30:00Z\"");
        assert_eq!(t.datetime().timestamp(), 1_714_566_600);
    }

    #[test]
    fn test_rfc3339_with_offset_normalizes_to_utc() {
        let t = ts("\"2024-05-01T14:30:00+02:00\"");
        assert_eq!(t, ts("\"2024-05-01T12:30:00Z\""));
    }

    #[test]
    fn test_timestamp_object() {
        let t = ts("{\"seconds\": 1714566600, \"nanos\": 500000000}");
        assert_eq!(t.datetime().timestamp(), 1_714_566_600);
        assert_eq!(t.datetime().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_timestamp_object_underscore_spelling() {
        let t = ts("{\"_seconds\": 1714566600, \"_nanoseconds\": 0}");
        assert_eq!(t, ts("\"2024-05-01T12:30:00Z\""));
    }

    #[test]
    fn test_raw_epoch_seconds() {
        assert_eq!(ts("1714566600"), ts("\"2024-05-01T12:30:00Z\""));
    }

    #[test]
    fn test_raw_epoch_milliseconds() {
        assert_eq!(ts("1714566600000"), ts("\"2024-05-01T12:30:00Z\""));
    }

    #[test]
    fn test_fractional_epoch_seconds() {
        let t = ts("1714566600.25");
        assert_eq!(t.datetime().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_invalid_string_rejected() {
        assert!(serde_json::from_str::<Timestamp>("\"yesterday\"").is_err());
    }

    #[test]
    fn test_serializes_as_rfc3339() {
        let t = ts("1714566600");
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.starts_with("\"2024-05-01T12:30:00"));
        // Round-trips through its own serialization.
        assert_eq!(ts(&json), t);
    }

    #[test]
    fn test_ordering() {
        assert!(ts("1714566600") < ts("1714566601"));
    }
}
