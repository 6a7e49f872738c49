//! Request-field helpers shared by the record handlers.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer};

use crate::error::{bad_request, ApiResult};

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

/// Accept a JSON number or a numeric string such as `"2021"` (HTML form
/// inputs submit strings). `null` and blank strings read as absent.
///
/// Use with `#[serde(default, deserialize_with = "lenient_number")]`.
pub fn lenient_number<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    match Option::<NumberOrText<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse()
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid number `{}`: {}", text, e)))
        }
    }
}

/// [`lenient_number`] for nullable patch fields: absent is `None`, `null`
/// or a blank string is `Some(None)`.
pub fn lenient_nullable_number<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    lenient_number(deserializer).map(Some)
}

/// Trim a string, mapping blank input to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate a `YYYY-MM-DD` calendar date, returning it in canonical form.
pub fn parse_date(value: &str) -> ApiResult<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| bad_request("Invalid date"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        notes: Option<Option<String>>,
    }

    #[test]
    fn test_double_option_distinguishes_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.notes, None);

        let null: Patch = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        assert_eq!(null.notes, Some(None));

        let set: Patch = serde_json::from_str(r#"{"notes": "x"}"#).unwrap();
        assert_eq!(set.notes, Some(Some("x".to_string())));
    }

    #[derive(Deserialize)]
    struct Reading {
        #[serde(default, deserialize_with = "lenient_number")]
        mileage: Option<i64>,
        #[serde(default, deserialize_with = "lenient_number")]
        cost: Option<f64>,
        #[serde(default, deserialize_with = "lenient_nullable_number")]
        engine_cc: Option<Option<i64>>,
    }

    #[test]
    fn test_lenient_number_accepts_numbers_and_numeric_strings() {
        let r: Reading = serde_json::from_str(r#"{"mileage": 1200, "cost": "45.50"}"#).unwrap();
        assert_eq!(r.mileage, Some(1200));
        assert_eq!(r.cost, Some(45.5));
        assert_eq!(r.engine_cc, None);

        let r: Reading = serde_json::from_str(r#"{"mileage": " 900 ", "cost": 12}"#).unwrap();
        assert_eq!(r.mileage, Some(900));
        assert_eq!(r.cost, Some(12.0));
    }

    #[test]
    fn test_lenient_number_blank_and_null() {
        let r: Reading =
            serde_json::from_str(r#"{"mileage": "", "cost": null, "engine_cc": ""}"#).unwrap();
        assert_eq!(r.mileage, None);
        assert_eq!(r.cost, None);
        assert_eq!(r.engine_cc, Some(None));

        let r: Reading = serde_json::from_str(r#"{"engine_cc": "649"}"#).unwrap();
        assert_eq!(r.engine_cc, Some(Some(649)));
    }

    #[test]
    fn test_lenient_number_rejects_garbage() {
        assert!(serde_json::from_str::<Reading>(r#"{"mileage": "lots"}"#).is_err());
        assert!(serde_json::from_str::<Reading>(r#"{"mileage": true}"#).is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Shop  ")), Some("Shop".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-03-05").unwrap(), "2024-03-05");
        assert_eq!(parse_date(" 2024-12-31 ").unwrap(), "2024-12-31");
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("yesterday").is_err());
    }
}
