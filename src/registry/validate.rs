//! Argument validation and scalar coercion.
//!
//! Language models routinely send `"42"` where a schema declares an integer,
//! or `"yes"` for a boolean. [`validate_arguments`] checks a raw argument map
//! against an [`InputSchema`] and coerces each supplied value to its declared
//! type:
//!
//! | Declared  | Accepted input                                     |
//! |-----------|----------------------------------------------------|
//! | `string`  | strings, numbers and booleans (stringified)        |
//! | `integer` | integers, integral floats, numeric strings         |
//! | `number`  | numbers, numeric strings                           |
//! | `boolean` | booleans, `0`/`1`, `true/yes/on/1`, `false/no/off/0` |
//! | `array`   | arrays only                                        |
//! | `object`  | objects only                                       |
//!
//! Validation is all-or-nothing: the cleaned arguments are only meaningful
//! when the report is valid. Running it twice on the same input gives the
//! same report.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{InputSchema, PropertySchema, SchemaType};

/// One problem with one argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Argument name.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating one argument map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Per-field problems.
    pub errors: Vec<FieldError>,
    /// Non-fatal notes, such as undeclared arguments passed through.
    pub warnings: Vec<String>,
    /// Coerced arguments, with defaults filled in.
    pub cleaned_arguments: Map<String, Value>,
}

impl ValidationReport {
    /// Joins the field errors into one line.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates `raw` against `schema`.
///
/// `raw` must be a JSON object or `null` (treated as no arguments). A `null`
/// field value counts as absent.
#[must_use]
pub fn validate_arguments(capability: &str, schema: &InputSchema, raw: &Value) -> ValidationReport {
    let empty = Map::new();
    let arguments = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return ValidationReport {
                valid: false,
                errors: vec![FieldError::new(
                    "arguments",
                    format!("expected an object, got {}", type_name(other)),
                )],
                warnings: Vec::new(),
                cleaned_arguments: Map::new(),
            };
        }
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut cleaned = Map::new();

    for field in &schema.required {
        if arguments.get(field).map_or(true, Value::is_null) {
            errors.push(FieldError::new(field, "required argument is missing"));
        }
    }

    for (name, value) in arguments {
        if value.is_null() {
            continue;
        }
        match schema.properties.get(name) {
            Some(property) => match coerce(value, property) {
                Ok(coerced) => {
                    cleaned.insert(name.clone(), coerced);
                }
                Err(message) => errors.push(FieldError::new(name, message)),
            },
            None => {
                tracing::warn!(capability, argument = %name, "Passing through undeclared argument");
                warnings.push(format!("unknown argument '{name}' passed through"));
                cleaned.insert(name.clone(), value.clone());
            }
        }
    }

    for (name, property) in &schema.properties {
        if cleaned.contains_key(name) {
            continue;
        }
        if let Some(default) = &property.default {
            cleaned.insert(name.clone(), default.clone());
        }
    }

    if !errors.is_empty() {
        tracing::warn!(capability, errors = errors.len(), "Argument validation failed");
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        cleaned_arguments: cleaned,
    }
}

/// Coerces one value to its declared type and checks `enum` membership.
fn coerce(value: &Value, property: &PropertySchema) -> Result<Value, String> {
    let coerced = match property.kind {
        SchemaType::String => coerce_string(value)?,
        SchemaType::Integer => coerce_integer(value)?,
        SchemaType::Number => coerce_number(value)?,
        SchemaType::Boolean => coerce_boolean(value)?,
        SchemaType::Array if value.is_array() => value.clone(),
        SchemaType::Object if value.is_object() => value.clone(),
        expected => {
            return Err(format!(
                "expected {}, got {}",
                expected.as_str(),
                type_name(value)
            ))
        }
    };

    if let Some(allowed) = &property.allowed {
        if !allowed.contains(&coerced) {
            let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!(
                "value {coerced} is not one of: {}",
                choices.join(", ")
            ));
        }
    }

    Ok(coerced)
}

fn coerce_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("expected string, got {}", type_name(other))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coerce_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() => Ok(value.clone()),
        Value::Number(n) if n.is_u64() => Err(format!("{n} is out of range for a 64-bit integer")),
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Ok(Value::from(f as i64))
            }
            _ => Err(format!("cannot convert {n} to integer")),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("cannot convert \"{s}\" to integer")),
        other => Err(format!("expected integer, got {}", type_name(other))),
    }
}

fn coerce_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::from(f)),
            _ => Err(format!("cannot convert \"{s}\" to number")),
        },
        other => Err(format!("expected number, got {}", type_name(other))),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("cannot convert {n} to boolean")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("cannot convert \"{s}\" to boolean")),
        },
        other => Err(format!("expected boolean, got {}", type_name(other))),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> InputSchema {
        InputSchema::object()
            .required_property("a", PropertySchema::integer("a"))
            .required_property("b", PropertySchema::integer("b"))
            .optional_property("ratio", PropertySchema::number("ratio"))
            .optional_property("verbose", PropertySchema::boolean("verbose").with_default(false))
            .optional_property(
                "level",
                PropertySchema::string("level").one_of(["basic", "detailed"]),
            )
            .optional_property("tags", PropertySchema::array("tags"))
    }

    #[test]
    fn coerces_numeric_strings() {
        let report = validate_arguments("t", &schema(), &json!({"a": "42", "b": 3}));
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.cleaned_arguments["a"], json!(42));
        assert_eq!(report.cleaned_arguments["b"], json!(3));
    }

    #[test]
    fn coerces_boolean_tokens() {
        let report = validate_arguments(
            "t",
            &schema(),
            &json!({"a": 1, "b": 2, "verbose": "true"}),
        );
        assert!(report.valid);
        assert_eq!(report.cleaned_arguments["verbose"], json!(true));

        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "verbose": "OFF"}));
        assert_eq!(report.cleaned_arguments["verbose"], json!(false));
    }

    #[test]
    fn rejects_unparseable_integer() {
        let report = validate_arguments("t", &schema(), &json!({"a": "abc", "b": 3}));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "a");
    }

    #[test]
    fn reports_missing_required_fields() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1}));
        assert!(!report.valid);
        assert_eq!(report.errors[0].field, "b");

        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": null}));
        assert!(!report.valid);
    }

    #[test]
    fn integral_floats_become_integers() {
        let report = validate_arguments("t", &schema(), &json!({"a": 2.0, "b": 3}));
        assert_eq!(report.cleaned_arguments["a"], json!(2));

        let report = validate_arguments("t", &schema(), &json!({"a": 2.5, "b": 3}));
        assert!(!report.valid);
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let report = validate_arguments("t", &schema(), &json!({"a": 9_223_372_036_854_775_808_u64, "b": 1}));
        assert!(!report.valid);
        assert_eq!(report.errors[0].field, "a");
        assert!(report.errors[0].message.contains("out of range"));

        let report = validate_arguments("t", &schema(), &json!({"a": 9.3e18, "b": 1}));
        assert!(!report.valid);

        let report = validate_arguments("t", &schema(), &json!({"a": i64::MAX, "b": i64::MIN}));
        assert!(report.valid);
    }

    #[test]
    fn number_accepts_strings() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "ratio": "0.5"}));
        assert_eq!(report.cleaned_arguments["ratio"], json!(0.5));

        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "ratio": "NaN"}));
        assert!(!report.valid);
    }

    #[test]
    fn enum_membership_is_enforced() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "level": "basic"}));
        assert!(report.valid);

        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "level": "loud"}));
        assert!(!report.valid);
        assert_eq!(report.errors[0].field, "level");
    }

    #[test]
    fn array_requires_array() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "tags": "x"}));
        assert!(!report.valid);

        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "tags": ["x"]}));
        assert!(report.valid);
    }

    #[test]
    fn unknown_fields_pass_through_with_warning() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2, "extra": [1]}));
        assert!(report.valid);
        assert_eq!(report.cleaned_arguments["extra"], json!([1]));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let report = validate_arguments("t", &schema(), &json!({"a": 1, "b": 2}));
        assert_eq!(report.cleaned_arguments["verbose"], json!(false));
        assert!(!report.cleaned_arguments.contains_key("level"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let report = validate_arguments("t", &schema(), &json!([1, 2]));
        assert!(!report.valid);
        assert_eq!(report.errors[0].field, "arguments");

        let report = validate_arguments("t", &InputSchema::object(), &Value::Null);
        assert!(report.valid);
    }

    #[test]
    fn validation_is_idempotent() {
        let raw = json!({"a": "7", "b": "x", "verbose": "yes", "other": 1});
        let first = validate_arguments("t", &schema(), &raw);
        let second = validate_arguments("t", &schema(), &raw);
        assert_eq!(first, second);
    }
}
