//! Timestamp handling for values crossing a service boundary.
//!
//! Peers exchange naive local timestamps as `YYYY-MM-DDTHH:MM:SS`. Input is
//! accepted leniently: a space instead of `T`, missing seconds, fractional
//! seconds, and date-only values (normalized to midnight).

use chrono::NaiveDateTime;

use crate::utils::error::AppError;

pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ACCEPTED_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, AppError> {
    let mut normalized = value.trim().replace(' ', "T");
    if normalized.len() == 10 {
        normalized.push_str("T00:00:00");
    }

    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid datetime '{value}'. Use ISO format (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)"
            ))
        })
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(WIRE_FORMAT).to_string()
}

/// `#[serde(with = "wire")]` for required timestamps.
pub mod wire {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// `#[serde(default, with = "wire_option")]` for optional timestamps.
pub mod wire_option {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&super::format_timestamp(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_timestamp(&raw).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn test_parse_accepts_wire_and_legacy_formats() {
        assert_eq!(parse_timestamp("2025-03-14T18:30:00").unwrap(), at(18, 30, 0));
        assert_eq!(parse_timestamp("2025-03-14 18:30:00").unwrap(), at(18, 30, 0));
        assert_eq!(parse_timestamp("2025-03-14T18:30").unwrap(), at(18, 30, 0));
    }

    #[test]
    fn test_date_only_is_midnight() {
        assert_eq!(parse_timestamp("2025-03-14").unwrap(), at(0, 0, 0));
    }

    #[test]
    fn test_garbage_is_a_validation_error() {
        assert!(matches!(
            parse_timestamp("next tuesday"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let value = at(9, 5, 7);
        assert_eq!(format_timestamp(&value), "2025-03-14T09:05:07");
        assert_eq!(parse_timestamp(&format_timestamp(&value)).unwrap(), value);
    }
}
