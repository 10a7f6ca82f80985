//! Input validation for the store boundary.
//!
//! Everything the store accepts from callers passes through here before any
//! backend write, so malformed input never produces a partially written
//! message or a silently wrong index range.

use crate::{Timestamp, ValidationError};
use chrono::{DateTime, NaiveDate};

/// The only accepted textual day format.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Require a non-blank text value.
pub fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Parse a calendar day written as `yyyy-mm-dd`.
///
/// The shape is checked before chrono sees the text: chrono alone would also
/// accept forms like `2024-3-1` or `+2024-03-01`, which are ambiguous for a
/// wire-facing parameter.
pub fn parse_day(text: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidValue {
        field: "day".to_string(),
        reason: format!("{reason}, got {text:?}"),
    };

    let bytes = text.as_bytes();
    let well_shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_shaped {
        return Err(invalid("expected a date formatted yyyy-mm-dd"));
    }

    NaiveDate::parse_from_str(text, DAY_FORMAT).map_err(|_| invalid("not a calendar date"))
}

/// Parse an RFC 3339 timestamp such as `2024-03-01T15:00:00Z`.
pub fn parse_send_time(text: &str) -> Result<Timestamp, ValidationError> {
    DateTime::parse_from_rfc3339(text.trim()).map_err(|e| ValidationError::InvalidValue {
        field: "sent_at".to_string(),
        reason: format!("not an RFC 3339 timestamp ({e}), got {text:?}"),
    })
}

/// Require a send time whose UTC offset is a whole number of minutes.
///
/// Records hold the send time in RFC 3339, which cannot express offset
/// seconds; such a time would read back as a different instant.
pub fn validate_send_time(sent_at: &Timestamp) -> Result<(), ValidationError> {
    let offset = sent_at.offset().local_minus_utc();
    if offset % 60 != 0 {
        return Err(ValidationError::InvalidValue {
            field: "sent_at".to_string(),
            reason: format!("UTC offset must be whole minutes, got {offset}s"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_require_text_rejects_blank() {
        assert!(require_text("sender", "A").is_ok());
        assert_eq!(
            require_text("sender", "   "),
            Err(ValidationError::RequiredFieldMissing {
                field: "sender".to_string()
            })
        );
        assert!(require_text("recipient", "").is_err());
    }

    #[test]
    fn test_parse_day_accepts_canonical_form() {
        let day = parse_day("2017-06-01").unwrap();
        assert_eq!((day.year(), day.month(), day.day()), (2017, 6, 1));
    }

    #[test]
    fn test_parse_day_rejects_loose_forms() {
        for text in [
            "2017-6-01",
            "2017-06-1",
            "+2017-06-01",
            "17-06-01",
            "2017/06/01",
            "2017-06-01T00:00:00Z",
            "20170601",
            "",
            "not a date",
        ] {
            let err = parse_day(text).unwrap_err();
            assert_eq!(err.field(), "day", "{text:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_day_rejects_impossible_dates() {
        assert!(parse_day("2023-02-29").is_err());
        assert!(parse_day("2024-13-01").is_err());
        assert!(parse_day("2024-02-29").is_ok());
    }

    #[test]
    fn test_parse_send_time_keeps_offset() {
        let ts = parse_send_time("2017-06-01T15:00:10+02:00").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 7200);
        assert_eq!(ts.hour(), 15);
        assert_eq!(ts.timestamp(), 1496322010);
    }

    #[test]
    fn test_validate_send_time_rejects_offset_seconds() {
        use chrono::{DateTime, FixedOffset};

        let utc = DateTime::from_timestamp(1_709_337_599, 0).unwrap();
        let odd = utc.with_timezone(&FixedOffset::east_opt(1).unwrap());
        assert_eq!(validate_send_time(&odd).unwrap_err().field(), "sent_at");

        let minutes = utc.with_timezone(&FixedOffset::east_opt(-5 * 3600 - 30 * 60).unwrap());
        assert!(validate_send_time(&minutes).is_ok());
        assert!(validate_send_time(&parse_send_time("2024-03-01T15:00:00+05:45").unwrap()).is_ok());
    }

    #[test]
    fn test_parse_send_time_rejects_non_time() {
        let err = parse_send_time("not a time").unwrap_err();
        assert_eq!(err.field(), "sent_at");
        assert!(parse_send_time("2017-06-01").is_err());
    }
}
