use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::IngestError;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parses the timestamp forms providers hand us. Offsets in the value win;
/// naive values are read in `timezone`, or UTC when none is configured.
/// Bare integers are unix seconds (or milliseconds past year 2286).
pub fn parse_timestamp(raw: &str, timezone: Option<Tz>) -> Result<DateTime<Utc>, IngestError> {
    let value = raw.trim();
    let invalid = |reason: &str| IngestError::Timestamp {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("empty value"));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let number: i64 = value.parse().map_err(|_| invalid("epoch out of range"))?;
        let parsed = if number > 9_999_999_999 {
            DateTime::from_timestamp_millis(number)
        } else {
            DateTime::from_timestamp(number, 0)
        };
        return parsed.ok_or_else(|| invalid("epoch out of range"));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| invalid("unrecognized format"))?;

    match timezone {
        None => Ok(Utc.from_utc_datetime(&naive)),
        Some(tz) => match tz.from_local_datetime(&naive) {
            LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(invalid("local time does not exist in timezone")),
        },
    }
}
