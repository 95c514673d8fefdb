//! Schema validation for structured LLM output.
//!
//! Validation is engine-agnostic: anything implementing [`SchemaValidator`]
//! can be dropped in, as long as it reports field-level violations as
//! [`ValidationError`] values. The built-in [`DefaultValidator`] covers the
//! JSON Schema subset used by the thinking-method output schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field-level schema violation.
///
/// This is the canonical failure shape regardless of which validator
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Dotted path to the offending field (e.g. `analysis.salience`).
    /// Empty string for document-level violations.
    pub field: String,
    pub message: String,
    /// The offending value, when one was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Pluggable schema validation seam.
pub trait SchemaValidator: Send + Sync {
    /// Validate `data` against `schema`, returning every violation found.
    fn validate(&self, schema: &Value, data: &Value) -> Result<(), Vec<ValidationError>>;
}

/// Built-in validator for the JSON Schema subset the method schemas use:
/// `type`, `required`, `properties`, `items`, `enum`, `minimum`/`maximum`,
/// `minItems`, and `additionalProperties: false`.
#[derive(Debug, Clone, Default)]
pub struct DefaultValidator;

impl SchemaValidator for DefaultValidator {
    fn validate(&self, schema: &Value, data: &Value) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        check_value(schema, data, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        other => type_name(value) == other,
    }
}

fn check_value(schema: &Value, data: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        if !matches_type(expected, data) {
            errors.push(ValidationError::new(
                path,
                format!("expected {}, got {}", expected, type_name(data)),
                Some(data.clone()),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(data) {
            errors.push(ValidationError::new(
                path,
                format!(
                    "value must be one of {}",
                    serde_json::to_string(allowed).unwrap_or_default()
                ),
                Some(data.clone()),
            ));
            return;
        }
    }

    match data {
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for field in required.iter().filter_map(|f| f.as_str()) {
                    if !map.contains_key(field) {
                        errors.push(ValidationError::new(
                            join_path(path, field),
                            format!("required field '{}' missing", field),
                            None,
                        ));
                    }
                }
            }

            let properties = schema.get("properties").and_then(|p| p.as_object());
            if let Some(props) = properties {
                for (key, sub_schema) in props {
                    if let Some(sub_value) = map.get(key) {
                        check_value(sub_schema, sub_value, &join_path(path, key), errors);
                    }
                }
            }

            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                if let Some(props) = properties {
                    for key in map.keys() {
                        if !props.contains_key(key) {
                            errors.push(ValidationError::new(
                                join_path(path, key),
                                format!("unexpected field '{}'", key),
                                Some(map[key].clone()),
                            ));
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(|m| m.as_u64()) {
                if (items.len() as u64) < min {
                    errors.push(ValidationError::new(
                        path,
                        format!("array must have at least {} items, has {}", min, items.len()),
                        Some(data.clone()),
                    ));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (idx, item) in items.iter().enumerate() {
                    check_value(item_schema, item, &join_path(path, &idx.to_string()), errors);
                }
            }
        }
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(0.0);
            if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
                if v < min {
                    errors.push(ValidationError::new(
                        path,
                        format!("{} is below minimum {}", v, min),
                        Some(data.clone()),
                    ));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
                if v > max {
                    errors.push(ValidationError::new(
                        path,
                        format!("{} is above maximum {}", v, max),
                        Some(data.clone()),
                    ));
                }
            }
        }
        _ => {}
    }
}

/// Build a human-readable restatement of a schema's requirements.
///
/// Used to augment the system prompt after a schema violation and in
/// schema-guidance results. Works from the schema document itself, never
/// from validator internals.
pub fn restate_requirements(schema: &Value) -> String {
    let mut lines = vec!["Your response MUST be a JSON object with:".to_string()];
    describe_object(schema, &mut lines, 0);
    lines.join("\n")
}

fn describe_object(schema: &Value, lines: &mut Vec<String>, depth: usize) {
    // Two levels is enough for a corrective prompt.
    if depth > 1 {
        return;
    }
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|f| f.as_str()).collect())
        .unwrap_or_default();

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in props {
            let ty = prop.get("type").and_then(|t| t.as_str()).unwrap_or("any");
            let indent = "  ".repeat(depth);
            let marker = if required.contains(&name.as_str()) {
                "required"
            } else {
                "optional"
            };
            let mut line = format!("{}- \"{}\" ({}, {})", indent, name, ty, marker);
            if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
                line.push_str(&format!(
                    ", one of {}",
                    serde_json::to_string(allowed).unwrap_or_default()
                ));
            }
            if let (Some(min), Some(max)) = (
                prop.get("minimum").and_then(|m| m.as_f64()),
                prop.get("maximum").and_then(|m| m.as_f64()),
            ) {
                line.push_str(&format!(", between {} and {}", min, max));
            }
            lines.push(line);
            if ty == "object" {
                describe_object(prop, lines, depth + 1);
            }
        }
    }
}
