//! Argument schemas: generation, normalization, and structural validation.

use schemars::r#gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::{Map, Value};

use tabwire_core::FieldViolation;

/// JSON Schema for `T` with every subschema inlined and `type` normalized.
pub fn argument_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("title");
        obj.remove("definitions");
    }
    normalize_schema_types(schema)
}

/// Unwrap single-element `type` arrays (`["object"]` -> `"object"`) at every level.
///
/// Multi-element unions are kept as arrays.
pub fn normalize_schema_types(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_schema_types).collect()),
        Value::Object(map) => {
            let out = map
                .into_iter()
                .map(|(key, val)| {
                    let val = match (key.as_str(), val) {
                        ("type", Value::Array(mut types)) if types.len() == 1 => types.remove(0),
                        ("type", Value::Array(types)) => Value::Array(types),
                        (_, other) => normalize_schema_types(other),
                    };
                    (key, val)
                })
                .collect();
            Value::Object(out)
        }
        other => other,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        "number" => value.is_number(),
        other => json_type_name(value) == other,
    }
}

fn join_path(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{base}.{field}")
    }
}

/// Check `value` against `schema`, collecting every violation.
///
/// Covers `type` (string or union), `required`, `properties`, `items`, and
/// `minimum`. Unknown keywords are ignored.
pub fn validate_against_schema(schema: &Value, value: &Value) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    check_node(schema, value, "", &mut violations);
    violations
}

fn check_node(schema: &Value, value: &Value, path: &str, out: &mut Vec<FieldViolation>) {
    let field = if path.is_empty() { "arguments" } else { path };

    let expected: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    if !expected.is_empty() && !expected.iter().any(|t| matches_type(t, value)) {
        out.push(FieldViolation::new(
            field,
            format!(
                "expected {}, got {}",
                expected.join(" or "),
                json_type_name(value)
            ),
        ));
        return;
    }

    if let (Some(min), Some(n)) = (
        schema.get("minimum").and_then(Value::as_f64),
        value.as_f64(),
    ) {
        if n < min {
            out.push(FieldViolation::new(field, format!("must be >= {min}")));
        }
    }

    match value {
        Value::Object(obj) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !obj.contains_key(name) {
                        out.push(FieldViolation::new(join_path(path, name), "is required"));
                    }
                }
            }
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, sub) in props {
                    if let Some(v) = obj.get(name) {
                        check_node(sub, v, &join_path(path, name), out);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
                for (i, item) in items.iter().enumerate() {
                    check_node(item_schema, item, &format!("{field}[{i}]"), out);
                }
            }
        }
        _ => {}
    }
}
