//! Date string parsing for metadata tag values
//!
//! Every accepted value is normalized to UTC. Values without an offset are
//! taken as UTC as-is.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Formats carrying an explicit offset (`%z` accepts `+0800` and `+08:00`)
const OFFSET_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%z",
    "%Y:%m:%d %H:%M:%S%.f%z",
    "%Y:%m:%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Formats without an offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
];

/// Date-only formats (midnight UTC)
const DATE_FORMATS: &[&str] = &["%Y:%m:%d", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a raw tag value into a UTC timestamp
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    let s = raw.trim().trim_matches('"').trim();

    if s.is_empty() || s.starts_with("0000") {
        return Err(parse_error(raw, "empty or zero date"));
    }

    // Trailing Z means UTC
    let owned;
    let s = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(stripped) => {
            owned = format!("{}+00:00", stripped);
            owned.as_str()
        }
        None => s,
    };

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format)
            && let Some(dt) = date.and_hms_opt(0, 0, 0)
        {
            return Ok(dt.and_utc());
        }
    }

    Err(parse_error(raw, "no accepted date format matched"))
}

fn parse_error(raw: &str, message: &str) -> Error {
    Error::TimestampParse {
        source_info: raw.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_exif_format() {
        let dt = parse_datetime("2024:01:15 14:30:00").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);

        // With quotes and subseconds
        let dt = parse_datetime("\"2024:01:15 14:30:00.123\"").unwrap();
        assert_eq!(dt.second(), 0);
        assert_eq!(dt.year(), 2024);
    }

    #[test]
    fn test_parse_with_offset_converts_to_utc() {
        // 14:30 +08:00 = 06:30 UTC
        let dt = parse_datetime("2024:01:15 14:30:00+08:00").unwrap();
        assert_eq!(dt.hour(), 6);
        assert_eq!(dt.minute(), 30);

        let dt = parse_datetime("2024-01-15T14:30:00-0200").unwrap();
        assert_eq!(dt.hour(), 16);

        let dt = parse_datetime("2024-01-15T14:30:00.500Z").unwrap();
        assert_eq!(dt.hour(), 14);

        let dt = parse_datetime("2024:01:15 23:30:00.25+01:00").unwrap();
        assert_eq!(dt.hour(), 22);
    }

    #[test]
    fn test_parse_alternative_formats() {
        assert_eq!(parse_datetime("2024-01-15 14:30:00").unwrap().year(), 2024);
        assert_eq!(parse_datetime("2024/01/15 14:30:00").unwrap().year(), 2024);
        assert_eq!(parse_datetime("2024:01:15 14:30").unwrap().minute(), 30);

        let dt = parse_datetime("2019:03:02").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2019, 3, 2, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datetime("invalid").is_err());
        assert!(parse_datetime("").is_err());
        assert!(parse_datetime("0000:00:00 00:00:00").is_err());
        assert!(parse_datetime("2024:13:45 10:00:00").is_err());
        assert!(matches!(
            parse_datetime("nope"),
            Err(Error::TimestampParse { .. })
        ));
    }
}
