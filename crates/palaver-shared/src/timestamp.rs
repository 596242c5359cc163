//! Parser for the restricted UTC timestamp text the chat server emits.
//!
//! Only `YYYY-MM-DDTHH:MM:SS[.fff]Z` is accepted. Offsets other than `Z`,
//! negative years and two-digit years are rejected rather than guessed at.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::TimestampError;

/// Parse a `YYYY-MM-DDTHH:MM:SS[.fff]Z` timestamp into a UTC instant.
///
/// The optional fraction is a decimal fraction of a second truncated to
/// millisecond precision. Without a fraction the milliseconds are zero.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TimestampError> {
    let (date, time) = text
        .split_once('T')
        .ok_or(TimestampError::MissingSeparator('T'))?;
    let time = time.strip_suffix('Z').ok_or(TimestampError::NotUtc)?;

    let date_fields = split_exact(date, '-', "date", 3)?;
    let year = number("year", date_fields[0], 4)?;
    let month = number("month", date_fields[1], 2)?;
    let day = number("day", date_fields[2], 2)?;

    let time_fields = split_exact(time, ':', "time", 3)?;
    let hour = number("hour", time_fields[0], 2)?;
    let minute = number("minute", time_fields[1], 2)?;

    let (second, millis) = match time_fields[2].split_once('.') {
        Some((second, fraction)) => (number("second", second, 2)?, millis(fraction)?),
        None => (number("second", time_fields[2], 2)?, 0),
    };

    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second, millis))
        .ok_or(TimestampError::OutOfRange)?;

    Ok(Utc.from_utc_datetime(&naive))
}

fn split_exact<'a>(
    text: &'a str,
    separator: char,
    segment: &'static str,
    expected: usize,
) -> Result<Vec<&'a str>, TimestampError> {
    let fields: Vec<&str> = text.split(separator).collect();
    if fields.len() != expected {
        return Err(TimestampError::FieldCount {
            segment,
            expected,
            actual: fields.len(),
        });
    }
    Ok(fields)
}

/// Parse a fixed-width run of ASCII digits. Signs and whitespace are rejected.
fn number(field: &'static str, value: &str, width: usize) -> Result<u32, TimestampError> {
    if value.len() != width || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| TimestampError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn millis(fraction: &str) -> Result<u32, TimestampError> {
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::InvalidNumber {
            field: "fraction",
            value: fraction.to_string(),
        });
    }

    // Right-pad to three digits, drop anything past milliseconds.
    Ok(fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0, |acc, digit| acc * 10 + u32::from(digit - b'0')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_milli_opt(h, mi, s, ms)
            .unwrap();
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn test_parse_without_fraction() {
        let parsed = parse_timestamp("2024-03-05T13:07:09Z").unwrap();
        assert_eq!(parsed, utc(2024, 3, 5, 13, 7, 9, 0));
        assert_eq!(parsed.timestamp_subsec_millis(), 0);
    }

    #[test]
    fn test_parse_with_millis() {
        let parsed = parse_timestamp("2024-03-05T13:07:09.250Z").unwrap();
        assert_eq!(parsed, utc(2024, 3, 5, 13, 7, 9, 250));
    }

    #[test]
    fn test_fraction_is_decimal() {
        assert_eq!(
            parse_timestamp("2024-03-05T13:07:09.25Z").unwrap(),
            utc(2024, 3, 5, 13, 7, 9, 250)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T13:07:09.5Z").unwrap(),
            utc(2024, 3, 5, 13, 7, 9, 500)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T13:07:09.123456Z").unwrap(),
            utc(2024, 3, 5, 13, 7, 9, 123)
        );
    }

    #[test]
    fn test_month_is_one_based() {
        let parsed = parse_timestamp("2023-12-31T23:59:59Z").unwrap();
        assert_eq!(parsed.month(), 12);
        assert_eq!(parsed.day(), 31);
        assert_eq!(parsed.hour(), 23);

        let parsed = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(parsed.month(), 1);
    }

    #[test]
    fn test_leap_day() {
        assert!(parse_timestamp("2024-02-29T12:00:00Z").is_ok());
        assert_eq!(
            parse_timestamp("2023-02-29T12:00:00Z"),
            Err(TimestampError::OutOfRange)
        );
    }

    #[test]
    fn test_rejects_offsets() {
        assert_eq!(
            parse_timestamp("2024-03-05T13:07:09+01:00"),
            Err(TimestampError::NotUtc)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T13:07:09"),
            Err(TimestampError::NotUtc)
        );
    }

    #[test]
    fn test_rejects_short_and_negative_years() {
        assert!(matches!(
            parse_timestamp("24-03-05T13:07:09Z"),
            Err(TimestampError::InvalidNumber { field: "year", .. })
        ));
        assert!(parse_timestamp("-2024-03-05T13:07:09Z").is_err());
    }

    #[test]
    fn test_rejects_malformed_shapes() {
        assert_eq!(
            parse_timestamp("2024-03-05 13:07:09Z"),
            Err(TimestampError::MissingSeparator('T'))
        );
        assert!(matches!(
            parse_timestamp("2024-03T13:07:09Z"),
            Err(TimestampError::FieldCount { segment: "date", .. })
        ));
        assert!(matches!(
            parse_timestamp("2024-03-05T13:07Z"),
            Err(TimestampError::FieldCount { segment: "time", .. })
        ));
        assert!(parse_timestamp("2024-03-05T13:07:09.Z").is_err());
        assert!(parse_timestamp("2024-03-05T13:07:xxZ").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        assert_eq!(
            parse_timestamp("2024-13-05T13:07:09Z"),
            Err(TimestampError::OutOfRange)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T24:00:00Z"),
            Err(TimestampError::OutOfRange)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T13:60:00Z"),
            Err(TimestampError::OutOfRange)
        );
    }
}
