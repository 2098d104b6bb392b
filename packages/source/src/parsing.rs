//! Shared parsing utilities for agency feature properties.
//!
//! Agencies publish dates and quantities in a handful of encodings. These
//! helpers accept the ones seen in practice and return `None` for anything
//! else so the caller can decide whether the record is usable.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Parses an ISO 8601 date or datetime (with optional fractional seconds).
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.date());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.date());
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Parses a `MM/DD/YYYY` text date.
#[must_use]
pub fn parse_mdy_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y").ok()
}

/// Converts epoch milliseconds (as exported by Esri services) to a date.
#[must_use]
pub fn parse_epoch_ms(ms: f64) -> Option<NaiveDate> {
    if !ms.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = ms as i64;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Reads a numeric property that may be encoded as a JSON number or string.
#[must_use]
pub fn parse_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_iso_date("2024-01-15"), expected);
        assert_eq!(parse_iso_date("2024-01-15T14:30:00.000"), expected);
        assert_eq!(parse_iso_date("2024-01-15 14:30:00"), expected);
        assert_eq!(parse_iso_date("2024-01-15T14:30:00Z"), expected);
        assert_eq!(parse_iso_date("15 Jan 2024"), None);
    }

    #[test]
    fn parses_mdy() {
        assert_eq!(parse_mdy_date("07/04/2022"), NaiveDate::from_ymd_opt(2022, 7, 4));
        assert_eq!(parse_mdy_date("2022-07-04"), None);
    }

    #[test]
    fn parses_epoch_ms() {
        assert_eq!(
            parse_epoch_ms(1_705_312_200_000.0),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(parse_epoch_ms(f64::NAN), None);
    }

    #[test]
    fn parses_numbers_from_strings() {
        assert_eq!(parse_number(&serde_json::json!(12.5)), Some(12.5));
        assert_eq!(parse_number(&serde_json::json!(" 40 ")), Some(40.0));
        assert_eq!(parse_number(&serde_json::json!("n/a")), None);
        assert_eq!(parse_number(&serde_json::json!(null)), None);
    }
}
