use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

// The backend emits naive ISO timestamps for some records; those are UTC.
const NAIVE_WITH_FRACTION: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
const NAIVE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 timestamp interpreted as UTC.
pub fn parse(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(dt) => Ok(dt),
        Err(err) => PrimitiveDateTime::parse(s, NAIVE_WITH_FRACTION)
            .or_else(|_| PrimitiveDateTime::parse(s, NAIVE))
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|_| err),
    }
}

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// The same conversions for optional timestamps.
pub mod option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => super::parse(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }

    pub fn serialize<S>(datetime: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match datetime {
            Some(datetime) => super::serialize(datetime, serializer),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn parses_rfc3339() {
        let dt = parse("2025-03-01T10:20:30+02:00").unwrap();
        assert_eq!(dt, datetime!(2025-03-01 08:20:30 UTC));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        assert_eq!(
            parse("2025-03-01T10:20:30").unwrap(),
            datetime!(2025-03-01 10:20:30 UTC)
        );
        assert_eq!(
            parse("2025-03-01T10:20:30.250000").unwrap(),
            datetime!(2025-03-01 10:20:30.25 UTC)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("yesterday").is_err());
    }
}
