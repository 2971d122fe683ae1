use time::Date;

use crate::errors::BackendError;

/// The wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` string into a [`Date`].
pub fn parse_date(value: &str) -> Result<Date, BackendError> {
    Date::parse(value, DATE_FORMAT).map_err(|_| BackendError::InvalidDate(value.to_owned()))
}

/// Formats a [`Date`] in the wire format.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
}

/// (De)serializes a [`Date`] as a `YYYY-MM-DD` string.
pub mod date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: String = Deserialize::deserialize(deserializer)?;
        super::parse_date(&value).map_err(serde::de::Error::custom)
    }
}

/// (De)serializes an `Option<Date>` as an optional `YYYY-MM-DD` string.
pub mod date_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_some(&super::format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Deserialize::deserialize(deserializer)?;

        match value {
            Some(value) => super::parse_date(&value)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// (De)serializes an `Option<OffsetDateTime>` as an optional Unix
/// timestamp, matching `time::serde::timestamp` for the non-optional
/// case.
pub mod timestamp_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(
        datetime: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match datetime {
            Some(datetime) => serializer.serialize_some(&datetime.unix_timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<i64> = Deserialize::deserialize(deserializer)?;

        Ok(value.map(OffsetDateTime::from_unix_timestamp))
    }
}
