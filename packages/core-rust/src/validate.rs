//! Typed field-level argument validation.
//!
//! Every validator reads one field out of an argument map and either returns
//! the typed value (applying a default when the field is absent and optional)
//! or a [`FieldError`] whose message is `"<field>: <reason>"`. The reasons are
//! a compatibility contract with existing clients:
//!
//! - `Required`
//! - `Expected string, received <kind>` (likewise `number`, `boolean`, `array`)
//! - `Number must be greater than or equal to <min>`
//! - `Number must be less than or equal to <max>`
//! - `Invalid enum value. Expected 'a' | 'b', received '<value>'`
//!
//! `<kind>` is the JSON kind of the offending value. A JSON `null` counts as
//! absent. Booleans are never accepted as numbers.
//!
//! Operations decode their arguments into a typed struct by implementing
//! [`FromArgs`].

use serde_json::{Map, Value};

use crate::error::FieldError;

pub type FieldResult<T> = Result<T, FieldError>;

/// Decodes a typed argument struct from an argument map.
pub trait FromArgs: Sized {
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    fn from_args(args: &Args<'_>) -> FieldResult<Self>;
}

/// Inclusive integer range constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntBounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl IntBounds {
    pub const ANY: Self = Self {
        min: None,
        max: None,
    };

    #[must_use]
    pub const fn range(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// JSON kind name used in `received <kind>` messages.
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read-only view over an operation's arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    #[must_use]
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// Decodes the whole map into `T`.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FieldError`] from `T::from_args`.
    pub fn decode<T: FromArgs>(&self) -> FieldResult<T> {
        T::from_args(self)
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn required<T>(field: &str, value: Option<T>) -> FieldResult<T> {
        value.ok_or_else(|| FieldError::required(field))
    }

    /// # Errors
    ///
    /// Fails when the field is present but not a string.
    pub fn optional_string(&self, field: &str) -> FieldResult<Option<String>> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(FieldError::wrong_kind(field, "string", kind_of(other))),
        }
    }

    /// # Errors
    ///
    /// Fails when the field is absent or not a string.
    pub fn required_string(&self, field: &str) -> FieldResult<String> {
        Self::required(field, self.optional_string(field)?)
    }

    /// Integer field. Non-integral numbers are truncated toward zero before the
    /// range check.
    ///
    /// # Errors
    ///
    /// Fails when the field is not a number or falls outside `bounds`.
    pub fn optional_int(&self, field: &str, bounds: IntBounds) -> FieldResult<Option<i64>> {
        let Some(value) = self.present(field) else {
            return Ok(None);
        };
        let Value::Number(number) = value else {
            return Err(FieldError::wrong_kind(field, "number", kind_of(value)));
        };

        #[allow(clippy::cast_possible_truncation)]
        let n = number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| i64::MAX))
            .unwrap_or_else(|| number.as_f64().map_or(0, |f| f.trunc() as i64));

        if let Some(min) = bounds.min.filter(|min| n < *min) {
            return Err(FieldError::new(
                field,
                format!("Number must be greater than or equal to {min}"),
            ));
        }
        if let Some(max) = bounds.max.filter(|max| n > *max) {
            return Err(FieldError::new(
                field,
                format!("Number must be less than or equal to {max}"),
            ));
        }
        Ok(Some(n))
    }

    /// # Errors
    ///
    /// See [`Args::optional_int`].
    pub fn int_or(&self, field: &str, bounds: IntBounds, default: i64) -> FieldResult<i64> {
        Ok(self.optional_int(field, bounds)?.unwrap_or(default))
    }

    /// # Errors
    ///
    /// Fails when absent, or see [`Args::optional_int`].
    pub fn required_int(&self, field: &str, bounds: IntBounds) -> FieldResult<i64> {
        Self::required(field, self.optional_int(field, bounds)?)
    }

    /// # Errors
    ///
    /// Fails when the field is present but not a boolean.
    pub fn optional_bool(&self, field: &str) -> FieldResult<Option<bool>> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(FieldError::wrong_kind(field, "boolean", kind_of(other))),
        }
    }

    /// Array of strings. Element failures are reported as `<field>.<index>`.
    ///
    /// # Errors
    ///
    /// Fails when the field is not an array or any element is not a string.
    pub fn optional_string_array(&self, field: &str) -> FieldResult<Option<Vec<String>>> {
        let Some(value) = self.present(field) else {
            return Ok(None);
        };
        let Value::Array(items) = value else {
            return Err(FieldError::wrong_kind(field, "array", kind_of(value)));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(FieldError::wrong_kind(
                    &format!("{field}.{index}"),
                    "string",
                    kind_of(other),
                )),
            })
            .collect::<FieldResult<Vec<_>>>()
            .map(Some)
    }

    /// String restricted to `options`, defaulting when absent.
    ///
    /// # Errors
    ///
    /// Fails when the value is not a string or not one of `options`.
    pub fn enumeration(&self, field: &str, options: &[&str], default: &str) -> FieldResult<String> {
        let Some(value) = self.optional_string(field)? else {
            return Ok(default.to_string());
        };
        if options.contains(&value.as_str()) {
            return Ok(value);
        }
        let expected = options
            .iter()
            .map(|o| format!("'{o}'"))
            .collect::<Vec<_>>()
            .join(" | ");
        Err(FieldError::new(
            field,
            format!("Invalid enum value. Expected {expected}, received '{value}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn message<T: std::fmt::Debug>(r: FieldResult<T>) -> String {
        r.unwrap_err().to_string()
    }

    #[test]
    fn required_string_missing_and_null() {
        let m = map(json!({ "other": 1, "title": null }));
        let args = Args::new(&m);
        assert_eq!(message(args.required_string("title")), "title: Required");
        assert_eq!(message(args.required_string("nope")), "nope: Required");
    }

    #[test]
    fn string_wrong_kind_names_json_kind() {
        let m = map(json!({ "a": 1, "b": true, "c": [], "d": {} }));
        let args = Args::new(&m);
        assert_eq!(message(args.optional_string("a")), "a: Expected string, received number");
        assert_eq!(message(args.optional_string("b")), "b: Expected string, received boolean");
        assert_eq!(message(args.optional_string("c")), "c: Expected string, received array");
        assert_eq!(message(args.optional_string("d")), "d: Expected string, received object");
    }

    #[test]
    fn int_rejects_booleans_and_strings() {
        let m = map(json!({ "limit": true, "n": "5" }));
        let args = Args::new(&m);
        assert_eq!(
            message(args.optional_int("limit", IntBounds::ANY)),
            "limit: Expected number, received boolean"
        );
        assert_eq!(
            message(args.optional_int("n", IntBounds::ANY)),
            "n: Expected number, received string"
        );
    }

    #[test]
    fn int_applies_default_and_truncates() {
        let m = map(json!({ "f": 7.9 }));
        let args = Args::new(&m);
        assert_eq!(args.int_or("limit", IntBounds::range(1, 100), 20).unwrap(), 20);
        assert_eq!(args.optional_int("f", IntBounds::ANY).unwrap(), Some(7));
    }

    #[test]
    fn int_bounds_messages() {
        let m = map(json!({ "low": 0, "high": 101 }));
        let args = Args::new(&m);
        let bounds = IntBounds::range(1, 100);
        assert_eq!(
            message(args.optional_int("low", bounds)),
            "low: Number must be greater than or equal to 1"
        );
        assert_eq!(
            message(args.optional_int("high", bounds)),
            "high: Number must be less than or equal to 100"
        );
    }

    #[test]
    fn bool_wrong_kind() {
        let m = map(json!({ "completed": "yes" }));
        assert_eq!(
            message(Args::new(&m).optional_bool("completed")),
            "completed: Expected boolean, received string"
        );
    }

    #[test]
    fn string_array_reports_element_path() {
        let m = map(json!({ "labels": ["a", "b", 3], "tags": "x" }));
        let args = Args::new(&m);
        assert_eq!(
            message(args.optional_string_array("labels")),
            "labels.2: Expected string, received number"
        );
        assert_eq!(
            message(args.optional_string_array("tags")),
            "tags: Expected array, received string"
        );
    }

    #[test]
    fn enumeration_default_and_violation() {
        let m = map(json!({ "format": "xml" }));
        let args = Args::new(&m);
        assert_eq!(args.enumeration("filter", &["all", "completed"], "all").unwrap(), "all");
        assert_eq!(
            message(args.enumeration("format", &["csv", "json"], "csv")),
            "format: Invalid enum value. Expected 'csv' | 'json', received 'xml'"
        );
    }

    #[derive(Debug)]
    struct ListArgs {
        limit: i64,
        label: Option<String>,
    }

    impl FromArgs for ListArgs {
        fn from_args(args: &Args<'_>) -> FieldResult<Self> {
            Ok(Self {
                limit: args.int_or("limit", IntBounds::range(1, 100), 20)?,
                label: args.optional_string("label")?,
            })
        }
    }

    #[test]
    fn typed_decode_via_from_args() {
        let m = map(json!({ "label": "home" }));
        let decoded: ListArgs = Args::new(&m).decode().unwrap();
        assert_eq!(decoded.limit, 20);
        assert_eq!(decoded.label.as_deref(), Some("home"));
    }

    proptest! {
        #[test]
        fn range_boundaries(min in -1000i64..1000, span in 0i64..1000, probe in -3000i64..3000) {
            let max = min + span;
            let m = map(json!({ "n": probe }));
            let result = Args::new(&m).optional_int("n", IntBounds::range(min, max));
            if probe < min {
                prop_assert_eq!(
                    result.unwrap_err().to_string(),
                    format!("n: Number must be greater than or equal to {min}")
                );
            } else if probe > max {
                prop_assert_eq!(
                    result.unwrap_err().to_string(),
                    format!("n: Number must be less than or equal to {max}")
                );
            } else {
                prop_assert_eq!(result.unwrap(), Some(probe));
            }
        }

        #[test]
        fn boundaries_themselves_succeed(min in -1000i64..1000, span in 0i64..1000) {
            let max = min + span;
            let bounds = IntBounds::range(min, max);
            let lo = map(json!({ "n": min }));
            let hi = map(json!({ "n": max }));
            prop_assert_eq!(Args::new(&lo).optional_int("n", bounds).unwrap(), Some(min));
            prop_assert_eq!(Args::new(&hi).optional_int("n", bounds).unwrap(), Some(max));
        }
    }
}
