//! Request validation from declared attribute rules.

use crate::config::{AttributeDescriptor, AttributeType, ResourceType};
use crate::error::ApiError;
use crate::store::Record;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body. All required attributes must be present and non-null.
    pub fn validate(resource: &ResourceType, values: &Record) -> Result<(), ApiError> {
        for attr in &resource.attributes {
            let val = values.get(&attr.name);
            if attr.required && val.map(Value::is_null).unwrap_or(true) {
                return Err(ApiError::Validation(format!("{} is required", attr.name)));
            }
            if let Some(v) = val {
                validate_field(attr, v)?;
            }
        }
        Ok(())
    }

    /// Validate only the attributes present (for PATCH). A present required attribute may not be null.
    pub fn validate_partial(resource: &ResourceType, values: &Record) -> Result<(), ApiError> {
        for (name, v) in values {
            if let Some(attr) = resource.attribute(name) {
                if attr.required && v.is_null() {
                    return Err(ApiError::Validation(format!("{} is required", attr.name)));
                }
                validate_field(attr, v)?;
            }
        }
        Ok(())
    }
}

fn validate_field(attr: &AttributeDescriptor, v: &Value) -> Result<(), ApiError> {
    if v.is_null() {
        return Ok(());
    }
    let col = &attr.name;
    let type_ok = match attr.type_ {
        AttributeType::String => v.is_string(),
        AttributeType::Number => v.is_number(),
        AttributeType::Boolean => v.is_boolean(),
        AttributeType::Json | AttributeType::Ref => true,
    };
    if !type_ok {
        return Err(ApiError::Validation(format!(
            "{} must be of type {}",
            col,
            serde_json::to_value(attr.type_)
                .ok()
                .and_then(|t| t.as_str().map(str::to_string))
                .unwrap_or_default()
        )));
    }
    if let (Some(max), Some(s)) = (attr.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(ApiError::Validation(format!(
                "{} must be at most {} characters",
                col, max
            )));
        }
    }
    if let (Some(min), Some(s)) = (attr.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(ApiError::Validation(format!(
                "{} must be at least {} characters",
                col, min
            )));
        }
    }
    if let Some(ref allowed) = attr.is_in {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(ApiError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;
    use yare::parameterized;

    fn resource() -> ResourceType {
        let registry = resolve(&FullConfig {
            models: serde_json::from_value(json!([{ "identity": "article", "attributes": {
                "title": { "type": "string", "required": true, "minLength": 2, "maxLength": 5 },
                "status": { "type": "string", "isIn": ["draft", "live"] },
                "rank": { "type": "number" }
            } }]))
            .unwrap(),
            ..FullConfig::default()
        })
        .unwrap();
        registry.get("article").cloned().unwrap()
    }

    fn body(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[parameterized(
        missing_required = { json!({ "status": "draft" }) },
        null_required = { json!({ "title": null }) },
        too_short = { json!({ "title": "a" }) },
        too_long = { json!({ "title": "abcdef" }) },
        not_in_list = { json!({ "title": "abc", "status": "gone" }) },
        wrong_type = { json!({ "title": "abc", "rank": "high" }) },
    )]
    fn test_invalid_create(values: Value) {
        assert!(matches!(
            RequestValidator::validate(&resource(), &body(values)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_valid_create_and_partial() {
        let r = resource();
        RequestValidator::validate(&r, &body(json!({ "title": "abc", "status": "live", "rank": 2 }))).unwrap();
        RequestValidator::validate_partial(&r, &body(json!({ "rank": 3 }))).unwrap();
        assert!(RequestValidator::validate_partial(&r, &body(json!({ "title": null }))).is_err());
    }
}
