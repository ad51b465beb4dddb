//! Validates tool-call parameters against a cached input schema,
//! translating `jsonschema` validation failures into the
//! [`crate::error_formatter`] vocabulary so callers get the same
//! suggestion-bearing shape regardless of which rule failed.
//!
//! Built on the `jsonschema` crate for runtime JSON Schema validation.

use serde_json::Value;

use crate::error_formatter::{self, FormattedErrors, RawValidationError, ValidationKind};

/// Validate `params` against `schema`. `Ok(())` when valid; otherwise the
/// formatted, suggestion-bearing error set.
pub fn validate(schema: &Value, params: &Value) -> Result<(), FormattedErrors> {
    let compiled = match jsonschema::validator_for(schema) {
        Ok(compiled) => compiled,
        Err(err) => {
            return Err(error_formatter::format_errors(vec![RawValidationError {
                kind: ValidationKind::Type,
                path: "$".to_string(),
                detail: Some(format!("schema itself is invalid: {err}")),
            }]));
        }
    };

    let raw_errors: Vec<RawValidationError> = compiled
        .iter_errors(params)
        .map(|error| classify(schema, &error))
        .collect();

    if raw_errors.is_empty() {
        Ok(())
    } else {
        Err(error_formatter::format_errors(raw_errors))
    }
}

fn classify(schema: &Value, error: &jsonschema::ValidationError<'_>) -> RawValidationError {
    let path = error.instance_path.to_string();
    let path = if path.is_empty() { "$".to_string() } else { path };
    let message = error.to_string();
    let subschema = schema_at(schema, &path);

    if message.contains("required property") || message.contains("is a required") {
        return RawValidationError {
            kind: ValidationKind::Required,
            path,
            detail: None,
        };
    }
    if message.contains("Additional properties") {
        return RawValidationError {
            kind: ValidationKind::AdditionalProperties,
            path,
            detail: None,
        };
    }
    if message.contains("is not one of") || message.contains("is not a valid enum") {
        let detail = subschema
            .and_then(|s| s.get("enum"))
            .map(|v| v.to_string());
        return RawValidationError {
            kind: ValidationKind::Enum,
            path,
            detail,
        };
    }
    if message.contains("does not match") {
        let detail = subschema
            .and_then(|s| s.get("pattern"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return RawValidationError {
            kind: ValidationKind::Pattern,
            path,
            detail,
        };
    }

    let detail = subschema
        .and_then(|s| s.get("type"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    RawValidationError {
        kind: ValidationKind::Type,
        path,
        detail,
    }
}

/// Walk a JSON Pointer (`/a/0/b`) through a schema's `properties`/`items`
/// nesting to find the subschema responsible for a given instance path.
fn schema_at<'a>(schema: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut current = schema;
    for segment in pointer.split('/').filter(|s| !s.is_empty() && *s != "$") {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        current = if segment.parse::<usize>().is_ok() {
            current.get("items")?
        } else {
            current.get("properties")?.get(&segment)?
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_params_pass() {
        let schema = json!({
            "type": "object",
            "required": ["path"],
            "properties": {"path": {"type": "string"}},
        });
        assert!(validate(&schema, &json!({"path": "a.txt"})).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let schema = json!({
            "type": "object",
            "required": ["path"],
            "properties": {"path": {"type": "string"}},
        });
        let errors = validate(&schema, &json!({})).unwrap_err();
        assert!(!errors.raw_errors.is_empty());
        assert!(errors.raw_errors.iter().any(|e| e.kind == ValidationKind::Required));
    }

    #[test]
    fn wrong_type_is_reported() {
        let schema = json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}},
        });
        let errors = validate(&schema, &json!({"count": "not a number"})).unwrap_err();
        assert!(errors.raw_errors.iter().any(|e| e.kind == ValidationKind::Type));
    }

    #[test]
    fn schema_at_resolves_nested_property() {
        let schema = json!({
            "type": "object",
            "properties": {"tags": {"type": "array", "items": {"type": "string"}}},
        });
        let resolved = schema_at(&schema, "/tags/0").unwrap();
        assert_eq!(resolved["type"], "string");
    }
}
