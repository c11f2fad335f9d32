use std::iter::repeat;
use std::path::{Path, PathBuf};

use base64::engine::GeneralPurpose;
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

pub fn base64_engine() -> GeneralPurpose {
    base64::engine::GeneralPurpose::new(
        &base64::alphabet::URL_SAFE,
        base64::engine::GeneralPurposeConfig::new(),
    )
}

/// Parses either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
///
/// A bare date resolves to midnight UTC, or to the last representable instant
/// of that day when `end_of_day` is set, so it can close an inclusive range.
pub fn parse_date(value: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(it) = DateTime::parse_from_rfc3339(value) {
        return Some(it.with_timezone(&Utc));
    }

    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?.and_utc();
    if end_of_day {
        Some(midnight + Duration::days(1) - Duration::nanoseconds(1))
    } else {
        Some(midnight)
    }
}

pub mod date_time_as_unix_seconds {
    // Based on: https://github.com/Keats/jsonwebtoken/blob/master/examples/custom_chrono.rs

    //! Custom serialization of DateTime<Utc> to conform to the JWT spec (RFC 7519 section 2, "Numeric Date")
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(date.timestamp())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Utc.timestamp_opt(i64::deserialize(deserializer)?, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("Invalid Unix timestamp value."))
    }
}
