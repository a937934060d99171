//! ISO-8601 timestamp handling at the remote boundary.
//!
//! Timestamps are held as `DateTime<Utc>` everywhere inside the engine and
//! only become strings inside remote rows. Formatting keeps full sub-second
//! precision so that a value pushed and pulled back compares equal.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp as an RFC 3339 string in UTC with a `Z` suffix.
#[must_use]
pub fn format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Formats an optional timestamp.
#[must_use]
pub fn format_opt(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format)
}

/// Parses a timestamp received in the given remote column.
///
/// Any offset is accepted and normalized to UTC.
pub fn parse(column: &'static str, value: &str) -> ModelResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ModelError::InvalidTimestamp {
            column,
            value: value.to_string(),
        })
}

/// Parses an optional timestamp column.
pub fn parse_opt(column: &'static str, value: Option<&str>) -> ModelResult<Option<DateTime<Utc>>> {
    value.map(|v| parse(column, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn format_uses_utc_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format(ts), "2024-03-01T12:30:00Z");
    }

    #[test]
    fn sub_second_precision_survives() {
        let ts = Utc.timestamp_nanos(1_709_296_200_123_456_789);
        assert_eq!(parse("updated_at", &format(ts)).unwrap(), ts);
    }

    #[test]
    fn offsets_are_normalized() {
        let parsed = parse("created_at", "2024-03-01T14:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn invalid_timestamp_names_column() {
        let err = parse("deleted_at", "2024-13-45").unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidTimestamp {
                column: "deleted_at",
                value: "2024-13-45".into()
            }
        );
    }

    #[test]
    fn optional_columns() {
        assert_eq!(parse_opt("deleted_at", None).unwrap(), None);
        assert!(parse_opt("deleted_at", Some("nope")).is_err());
        assert_eq!(format_opt(None), None);
    }

    proptest! {
        #[test]
        fn any_instant_survives_the_boundary(nanos in any::<i64>()) {
            let ts = Utc.timestamp_nanos(nanos);
            let formatted = format(ts);
            prop_assert!(formatted.ends_with('Z'));
            prop_assert_eq!(parse("updated_at", &formatted).unwrap(), ts);
        }
    }
}
