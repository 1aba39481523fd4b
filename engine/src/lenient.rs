//! Lenient field parsing.
//!
//! The server does not send a stable wire type for a given logical field:
//! amounts arrive as `"2.5"` or `2.5`, flags as `true`, `1` or `"1"`. Every
//! target type has an ordered table of coercion attempts; the first attempt
//! that succeeds wins, and a decode error is raised only when all of them
//! fail.
//!
//! | target | native | numeric string | alternate |
//! |--------|--------|----------------|-----------|
//! | Bool   | `true` | `"1"`, `"true"` | `1`, `1.0` |
//! | Int    | `3`    | `"3"`          | `3.9`, `"3.9"` (truncated) |
//! | Double | `2.5`  | `"2.5"`        | `2` |
//! | String | `"a"`  | -              | `3`, `true` |
//!
//! The `parse_opt_*` variants treat a missing field, `null`, and (for
//! non-string targets) the empty string as absent.

use crate::{error::Result, Error, FieldType};
use serde_json::Value;

/// One coercion attempt: `None` means "not applicable, try the next one".
type Coercion<T> = fn(&Value) -> Option<T>;

const BOOL_ATTEMPTS: &[Coercion<bool>] = &[native_bool, bool_from_string, bool_from_number];
const INT_ATTEMPTS: &[Coercion<i64>] = &[native_int, int_from_string, int_from_fraction];
const DOUBLE_ATTEMPTS: &[Coercion<f64>] = &[native_double, double_from_string, double_from_int];
const STRING_ATTEMPTS: &[Coercion<String>] = &[native_string, string_from_scalar];

fn first_success<T>(attempts: &[Coercion<T>], value: &Value) -> Option<T> {
    attempts.iter().find_map(|attempt| attempt(value))
}

fn native_bool(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn bool_from_string(value: &Value) -> Option<bool> {
    let text = value.as_str()?.trim();
    if text == "1" || text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text == "0" || text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn bool_from_number(value: &Value) -> Option<bool> {
    match value.as_f64()? {
        n if n == 1.0 => Some(true),
        n if n == 0.0 => Some(false),
        _ => None,
    }
}

fn native_int(value: &Value) -> Option<i64> {
    value.as_i64()
}

fn int_from_string(value: &Value) -> Option<i64> {
    value.as_str()?.trim().parse().ok()
}

fn int_from_fraction(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let truncated = number.trunc();
    // `as` saturates, so out-of-range values must be rejected up front
    if number.is_finite() && (i64::MIN as f64..i64::MAX as f64).contains(&truncated) {
        Some(truncated as i64)
    } else {
        None
    }
}

fn native_double(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if n.is_f64() => n.as_f64(),
        _ => None,
    }
}

fn double_from_string(value: &Value) -> Option<f64> {
    value
        .as_str()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn double_from_int(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) if !n.is_f64() => n.as_f64(),
        _ => None,
    }
}

fn native_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn string_from_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a boolean field.
pub fn parse_bool(field: &str, value: &Value) -> Result<bool> {
    first_success(BOOL_ATTEMPTS, value)
        .ok_or_else(|| mismatch(field, FieldType::Bool, value))
}

/// Parse an integer field.
pub fn parse_int(field: &str, value: &Value) -> Result<i64> {
    first_success(INT_ATTEMPTS, value)
        .ok_or_else(|| mismatch(field, FieldType::Int, value))
}

/// Parse a floating point field.
pub fn parse_double(field: &str, value: &Value) -> Result<f64> {
    first_success(DOUBLE_ATTEMPTS, value)
        .ok_or_else(|| mismatch(field, FieldType::Double, value))
}

/// Parse a string field.
pub fn parse_string(field: &str, value: &Value) -> Result<String> {
    first_success(STRING_ATTEMPTS, value)
        .ok_or_else(|| mismatch(field, FieldType::String, value))
}

/// Parse an optional boolean field.
pub fn parse_opt_bool(field: &str, value: Option<&Value>) -> Result<Option<bool>> {
    present(value, false)
        .map(|v| parse_bool(field, v))
        .transpose()
}

/// Parse an optional integer field.
pub fn parse_opt_int(field: &str, value: Option<&Value>) -> Result<Option<i64>> {
    present(value, false)
        .map(|v| parse_int(field, v))
        .transpose()
}

/// Parse an optional floating point field.
pub fn parse_opt_double(field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    present(value, false)
        .map(|v| parse_double(field, v))
        .transpose()
}

/// Parse an optional string field. The empty string is a value here.
pub fn parse_opt_string(field: &str, value: Option<&Value>) -> Result<Option<String>> {
    present(value, true)
        .map(|v| parse_string(field, v))
        .transpose()
}

/// Coerce `value` to the canonical JSON form of `field_type`.
///
/// Returns `Ok(None)` when the value is absent.
pub fn normalize(
    field: &str,
    field_type: FieldType,
    value: Option<&Value>,
) -> Result<Option<Value>> {
    let normalized = match field_type {
        FieldType::Bool => parse_opt_bool(field, value)?.map(Value::Bool),
        FieldType::Int => parse_opt_int(field, value)?.map(Value::from),
        FieldType::Double => parse_opt_double(field, value)?.map(Value::from),
        FieldType::String => parse_opt_string(field, value)?.map(Value::String),
        FieldType::Json => present(value, true).cloned(),
    };
    Ok(normalized)
}

/// Filter out the representations of "no value".
fn present(value: Option<&Value>, empty_string_is_value: bool) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() && !empty_string_is_value => None,
        Some(v) => Some(v),
    }
}

fn mismatch(field: &str, expected: FieldType, value: &Value) -> Error {
    Error::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: json_type_name(value).to_string(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Double",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

/// `deserialize_with` helpers for typed models.
///
/// ```
/// use serde::Deserialize;
/// use stockpile_engine::lenient::de;
///
/// #[derive(Deserialize)]
/// struct Chore {
///     #[serde(deserialize_with = "de::int")]
///     id: i64,
///     #[serde(default, deserialize_with = "de::opt_bool")]
///     track_date_only: Option<bool>,
/// }
///
/// let chore: Chore = serde_json::from_str(r#"{"id": "4", "track_date_only": "1"}"#).unwrap();
/// assert_eq!(chore.id, 4);
/// assert_eq!(chore.track_date_only, Some(true));
/// ```
pub mod de {
    use serde::{de::Error as _, Deserialize, Deserializer};
    use serde_json::Value;

    const FIELD: &str = "value";

    pub fn bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_bool(FIELD, &value).map_err(D::Error::custom)
    }

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_int(FIELD, &value).map_err(D::Error::custom)
    }

    pub fn double<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_double(FIELD, &value).map_err(D::Error::custom)
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_opt_bool(FIELD, Some(&value)).map_err(D::Error::custom)
    }

    pub fn opt_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_opt_int(FIELD, Some(&value)).map_err(D::Error::custom)
    }

    pub fn opt_double<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::parse_opt_double(FIELD, Some(&value)).map_err(D::Error::custom)
    }
}
