//! Column encodings shared by the SQLite repositories.
//!
//! Timestamps are stored as unix milliseconds, enums as their snake_case
//! names, and structured values (locations, audit trails) as JSON text.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn opt_millis(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(to_millis)
}

pub(crate) fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

pub(crate) fn from_opt_millis(
    idx: usize,
    millis: Option<i64>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    millis.map(|value| from_millis(idx, value)).transpose()
}

/// Parse a text column through `FromStr`.
pub(crate) fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(crate) fn from_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_keep_sub_second_precision() {
        let time = DateTime::from_timestamp_millis(1_741_089_600_123).expect("valid");
        assert_eq!(from_millis(0, to_millis(time)).expect("decode"), time);
    }

    #[test]
    fn bad_enum_text_is_a_conversion_failure() {
        let err = parse_text::<fieldclock_domain::SessionType>(3, "lunch").expect_err("unknown");
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _)));
    }
}
