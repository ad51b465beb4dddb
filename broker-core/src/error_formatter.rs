//! Turns raw JSON-schema validation failures into actionable messages.
//!
//! Groups errors by kind, emits one human-readable block per kind plus
//! template-driven suggestions, and always preserves the raw errors
//! untouched for callers that want them (backward compatibility with
//! whatever validator produced them).

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    Required,
    Type,
    Enum,
    Pattern,
    AdditionalProperties,
}

#[derive(Debug, Clone)]
pub struct RawValidationError {
    pub kind: ValidationKind,
    pub path: String,
    /// For `Type`: the expected type name. For `Enum`: the allowed values
    /// serialized as JSON. For `Pattern`: the regex source. Unused by the
    /// other kinds.
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FormattedErrors {
    pub user_friendly: String,
    pub suggestions: Vec<String>,
    pub raw_errors: Vec<RawValidationError>,
}

pub fn format_errors(errors: Vec<RawValidationError>) -> FormattedErrors {
    let mut blocks = Vec::new();
    let mut suggestions = Vec::new();

    for kind in [
        ValidationKind::Required,
        ValidationKind::Type,
        ValidationKind::Enum,
        ValidationKind::Pattern,
        ValidationKind::AdditionalProperties,
    ] {
        let group: Vec<&RawValidationError> = errors.iter().filter(|e| e.kind == kind).collect();
        if group.is_empty() {
            continue;
        }

        let paths: Vec<&str> = group.iter().map(|e| e.path.as_str()).collect();
        blocks.push(format!("{}: {}", kind_label(&kind), paths.join(", ")));

        for err in &group {
            if let Some(suggestion) = suggest(&kind, err) {
                suggestions.push(suggestion);
            }
        }
    }

    FormattedErrors {
        user_friendly: blocks.join("\n"),
        suggestions,
        raw_errors: errors,
    }
}

fn kind_label(kind: &ValidationKind) -> &'static str {
    match kind {
        ValidationKind::Required => "Missing required field(s)",
        ValidationKind::Type => "Wrong type",
        ValidationKind::Enum => "Invalid enum value",
        ValidationKind::Pattern => "Does not match required pattern",
        ValidationKind::AdditionalProperties => "Unexpected parameter(s)",
    }
}

fn suggest(kind: &ValidationKind, err: &RawValidationError) -> Option<String> {
    match kind {
        ValidationKind::Required => None,
        ValidationKind::Type => match err.detail.as_deref() {
            Some("string") => Some(format!("'{}': Wrap in quotes", err.path)),
            Some("number") | Some("integer") => {
                Some(format!("'{}': Remove quotes", err.path))
            }
            Some("array") => Some(format!("'{}': Wrap in array brackets", err.path)),
            _ => None,
        },
        ValidationKind::Enum => {
            let allowed = err.detail.as_deref().unwrap_or("[]");
            Some(format!("'{}': allowed values are {allowed}", err.path))
        }
        ValidationKind::Pattern => {
            let pattern = err.detail.as_deref().unwrap_or("");
            if pattern.contains('@') {
                Some(format!("'{}': expected an email address", err.path))
            } else if pattern.starts_with("^http") {
                Some(format!("'{}': expected a URL", err.path))
            } else {
                Some(format!("'{}': must match pattern {pattern}", err.path))
            }
        }
        ValidationKind::AdditionalProperties => {
            Some(format!("'{}': Remove unexpected parameter", err.path))
        }
    }
}

/// Convenience constructor for a `Type` mismatch, capturing the JSON value
/// that was actually supplied so the coercion hint (`number<->string` /
/// `scalar->array`) can be chosen from its shape.
pub fn type_error(path: impl Into<String>, expected: &str, actual: &Value) -> RawValidationError {
    let detail = if actual.is_array() {
        Some("array".to_string())
    } else {
        Some(expected.to_string())
    };
    RawValidationError {
        kind: ValidationKind::Type,
        path: path.into(),
        detail,
    }
}
