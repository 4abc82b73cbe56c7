//! Lenient serde helpers for values exchanged with the remote service.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const DATE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
const NAIVE_TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

/// Parse a calendar date, accepting either `YYYY-MM-DD` or a full timestamp.
#[must_use]
pub fn parse_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    Date::parse(head, DATE_FORMAT).ok()
}

/// Format a calendar date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_default()
}

/// Parse a timestamp. RFC 3339 first, then an offset-less timestamp read as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    OffsetDateTime::parse(trimmed, &Rfc3339).ok().or_else(|| {
        let normalized = trimmed.replacen(' ', "T", 1);
        PrimitiveDateTime::parse(&normalized, NAIVE_TIMESTAMP_FORMAT)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}

/// Serde adapter for `Option<Date>` columns.
pub mod date_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    /// Serialize as `YYYY-MM-DD` or `null`.
    ///
    /// # Errors
    /// Propagates serializer failures.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<Date>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => s.serialize_str(&super::format_date(*date)),
            None => s.serialize_none(),
        }
    }

    /// Deserialize from a date or timestamp string; unparsable input becomes `None`.
    ///
    /// # Errors
    /// Returns an error when the value is neither a string nor `null`.
    pub fn deserialize<'de, D>(d: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_date))
    }
}

/// Serializer for clearable date fields in patches: `Some(None)` writes `null`.
pub mod date_patch {
    use serde::Serializer;
    use time::Date;

    /// Serialize the inner value as `YYYY-MM-DD` or `null`.
    ///
    /// # Errors
    /// Propagates serializer failures.
    #[allow(clippy::ref_option, clippy::option_option)]
    pub fn serialize<S>(value: &Option<Option<Date>>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::date_opt::serialize(&(*value).flatten(), s)
    }
}

/// Serde adapter for required timestamp columns.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    /// Serialize as RFC 3339.
    ///
    /// # Errors
    /// Returns an error when the timestamp cannot be formatted.
    pub fn serialize<S>(value: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    /// Deserialize from RFC 3339 or an offset-less timestamp.
    ///
    /// # Errors
    /// Returns an error when the string is not a recognised timestamp.
    pub fn deserialize<'de, D>(d: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for optional timestamp columns.
pub mod timestamp_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    /// Serialize as RFC 3339 or `null`.
    ///
    /// # Errors
    /// Returns an error when the timestamp cannot be formatted.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => super::timestamp::serialize(ts, s),
            None => s.serialize_none(),
        }
    }

    /// Deserialize leniently; unparsable input becomes `None`.
    ///
    /// # Errors
    /// Returns an error when the value is neither a string nor `null`.
    pub fn deserialize<'de, D>(d: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}
