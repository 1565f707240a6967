//! Argument checks against a tool's declared input schema
//!
//! Covers the subset of JSON Schema that tool servers actually emit: `type`,
//! `required`, `properties`, `additionalProperties: false`, `enum` and array
//! `items`. Unknown keywords are ignored.

use serde_json::Value;

/// Check `args` against `schema`, returning every violation found
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let mut errors = Vec::new();
    check(schema, args, "arguments", &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            errors.push(format!(
                "{} must be {}, got {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            errors.push(format!("{} must be one of {}", path, Value::Array(options.clone())));
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    errors.push(format!("missing required field `{}`", key));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

        for (key, item) in map {
            match properties.and_then(|p| p.get(key)) {
                Some(sub) => check(sub, item, &format!("{}.{}", path, key), errors),
                None if closed => errors.push(format!("unexpected field `{}`", key)),
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
