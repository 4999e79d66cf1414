//! Tool-argument validation against JSON-schema parameter declarations.
//!
//! Covers the subset of JSON Schema the tool definitions use: required
//! properties and primitive type checks. Violations fail the call before the
//! skill runs.

use serde_json::Value;

/// Validate `args` against a tool's `parameters` schema.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let args_obj = match args {
        Value::Object(map) => map,
        Value::Null => {
            return match required_names(schema) {
                names if names.is_empty() => Ok(()),
                names => Err(format!("missing required parameter: {}", names[0])),
            };
        }
        other => return Err(format!("arguments must be a JSON object, got: {other}")),
    };

    for name in required_names(schema) {
        match args_obj.get(&name) {
            None | Some(Value::Null) => {
                return Err(format!("missing required parameter: {name}"));
            }
            Some(_) => {}
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in args_obj {
        let Some(declared) = properties.get(name) else {
            continue; // extra fields pass through to the skill
        };
        let Some(expected) = declared.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !type_matches(expected, value) {
            return Err(format!(
                "invalid type for parameter: {name} (expected {expected})"
            ));
        }
    }

    Ok(())
}

fn required_names(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "count": {"type": "integer"},
                "deep": {"type": "boolean"}
            },
            "required": ["query"]
        })
    }

    #[test]
    fn valid_arguments_pass() {
        let args = json!({"query": "cats", "count": 3});
        assert!(validate_arguments(&schema(), &args).is_ok());
    }

    #[test]
    fn missing_required_fails() {
        let err = validate_arguments(&schema(), &json!({"count": 3})).unwrap_err();
        assert!(err.contains("query"));
    }

    #[test]
    fn null_required_fails() {
        let err = validate_arguments(&schema(), &json!({"query": null})).unwrap_err();
        assert!(err.contains("query"));
    }

    #[test]
    fn wrong_type_fails() {
        let err = validate_arguments(&schema(), &json!({"query": 42})).unwrap_err();
        assert!(err.contains("expected string"));

        let err = validate_arguments(&schema(), &json!({"query": "x", "count": "three"}))
            .unwrap_err();
        assert!(err.contains("expected integer"));
    }

    #[test]
    fn extra_fields_are_allowed() {
        let args = json!({"query": "x", "unknown_extra": true});
        assert!(validate_arguments(&schema(), &args).is_ok());
    }

    #[test]
    fn non_object_arguments_rejected() {
        assert!(validate_arguments(&schema(), &json!([1, 2])).is_err());
        assert!(validate_arguments(&schema(), &json!("text")).is_err());
    }

    #[test]
    fn null_arguments_ok_without_required() {
        let empty_schema = json!({"type": "object", "properties": {}});
        assert!(validate_arguments(&empty_schema, &Value::Null).is_ok());
        assert!(validate_arguments(&schema(), &Value::Null).is_err());
    }

    #[test]
    fn number_accepts_float_and_int() {
        let schema = json!({
            "type": "object",
            "properties": {"importance": {"type": "number"}},
            "required": ["importance"]
        });
        assert!(validate_arguments(&schema, &json!({"importance": 0.5})).is_ok());
        assert!(validate_arguments(&schema, &json!({"importance": 1})).is_ok());
        assert!(validate_arguments(&schema, &json!({"importance": "high"})).is_err());
    }
}
