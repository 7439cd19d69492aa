//! Attribute filters from the query string.
//!
//! `a=v`, `a[mod]=v`, `a[]=v1&a[]=v2`, `where={"a":{"contains":"x"}}`, `where[a][mod]=v`.
//! `id` and `ids` address the primary key.

use crate::case::to_camel_case;
use crate::config::{AssociationKind, AttributeType, ResourceType, SchemaRegistry};
use crate::error::ApiError;
use crate::store::{Condition, Criteria};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Query keys that are directives, not filters.
const RESERVED: &[&str] = &["include", "fields", "sort", "limit", "skip", "populate", "select", "omit", "callback"];

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\[\]]+)((?:\[[^\[\]]*\])*)$").expect("key pattern compiles"));

static BRACKET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("bracket pattern compiles"));

/// `where[a][contains]` -> ("where", ["a", "contains"]).
fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let caps = KEY_PATTERN.captures(key)?;
    let base = caps.get(1)?.as_str();
    let brackets = caps
        .get(2)
        .map(|m| {
            BRACKET_PATTERN
                .captures_iter(m.as_str())
                .filter_map(|c| c.get(1).map(|g| g.as_str()))
                .collect()
        })
        .unwrap_or_default();
    Some((base, brackets))
}

/// Storage type used to coerce string values for `field` (foreign keys take the target's key type).
fn field_type(registry: &SchemaRegistry, resource: &ResourceType, field: &str) -> AttributeType {
    if let Some(attr) = resource.attribute(field) {
        return attr.type_;
    }
    resource
        .association(field)
        .filter(|a| a.kind == AssociationKind::BelongsToOne)
        .and_then(|a| registry.get(&a.target))
        .map(|t| t.primary_key_type())
        .unwrap_or(AttributeType::String)
}

/// Coerce a query-string value to the JSON type of the attribute.
pub fn coerce_value(ty: AttributeType, raw: &str) -> Result<Value, ApiError> {
    if raw == "null" {
        return Ok(Value::Null);
    }
    match ty {
        AttributeType::Number => {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(Value::from(i));
            }
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| ApiError::BadRequest(format!("'{}' is not a number", raw)))
        }
        AttributeType::Boolean => match raw {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(ApiError::BadRequest(format!("'{}' is not a boolean", raw))),
        },
        AttributeType::String => Ok(Value::String(raw.to_string())),
        AttributeType::Json | AttributeType::Ref => {
            Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
        }
    }
}

/// Primary key value from a path segment, or None when it cannot be a key of `resource`.
pub fn coerce_key(resource: &ResourceType, raw: &str) -> Option<Value> {
    match resource.primary_key_type() {
        AttributeType::Number => raw.parse::<i64>().ok().map(Value::from),
        _ => Some(Value::String(raw.to_string())),
    }
}

struct CriteriaBuilder<'a> {
    registry: &'a SchemaRegistry,
    resource: &'a ResourceType,
    criteria: Criteria,
    members: IndexMap<String, Vec<Value>>,
}

impl<'a> CriteriaBuilder<'a> {
    fn field(&self, raw: &str) -> Result<String, ApiError> {
        if raw == "id" || raw == "ids" {
            return Ok(self.resource.primary_key.clone());
        }
        let name = to_camel_case(raw);
        if self.resource.has_column(&name) {
            Ok(name)
        } else {
            Err(ApiError::BadRequest(format!("unknown attribute '{}'", raw)))
        }
    }

    fn coerce(&self, field: &str, raw: &str) -> Result<Value, ApiError> {
        coerce_value(field_type(self.registry, self.resource, field), raw)
    }

    fn text(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn condition(&self, modifier: &str, value: Value) -> Result<Condition, ApiError> {
        let list = |v: Value| match v {
            Value::Array(items) => items,
            other => vec![other],
        };
        Ok(match modifier {
            "contains" => Condition::Contains(Self::text(&value)),
            "startsWith" | "starts-with" => Condition::StartsWith(Self::text(&value)),
            "endsWith" | "ends-with" => Condition::EndsWith(Self::text(&value)),
            "<" | "lessThan" | "lt" => Condition::Lt(value),
            "<=" | "lessThanOrEqual" | "lte" => Condition::Lte(value),
            ">" | "greaterThan" | "gt" => Condition::Gt(value),
            ">=" | "greaterThanOrEqual" | "gte" => Condition::Gte(value),
            "!=" | "!" | "not" | "ne" => match value {
                Value::Array(items) => Condition::NotIn(items),
                v => Condition::Ne(v),
            },
            "in" => Condition::In(list(value)),
            "nin" => Condition::NotIn(list(value)),
            other => return Err(ApiError::BadRequest(format!("unsupported filter modifier '{}'", other))),
        })
    }

    /// One query-string pair addressing `raw_field` with optional modifier.
    fn push_raw(&mut self, raw_field: &str, modifier: Option<&str>, raw: &str) -> Result<(), ApiError> {
        let field = self.field(raw_field)?;
        match modifier {
            None if raw_field == "ids" => {
                for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let v = self.coerce(&field, part)?;
                    self.members.entry(field.clone()).or_default().push(v);
                }
            }
            None => {
                let v = self.coerce(&field, raw)?;
                self.criteria.push(field, Condition::Eq(v));
            }
            Some("") => {
                let v = self.coerce(&field, raw)?;
                self.members.entry(field).or_default().push(v);
            }
            Some(m @ ("in" | "nin")) => {
                let values = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| self.coerce(&field, p))
                    .collect::<Result<Vec<_>, _>>()?;
                let c = self.condition(m, Value::Array(values))?;
                self.criteria.push(field, c);
            }
            Some(m @ ("contains" | "startsWith" | "starts-with" | "endsWith" | "ends-with")) => {
                let c = self.condition(m, Value::String(raw.to_string()))?;
                self.criteria.push(field, c);
            }
            Some(m) => {
                let v = self.coerce(&field, raw)?;
                let c = self.condition(m, v)?;
                self.criteria.push(field, c);
            }
        }
        Ok(())
    }

    /// A `where` JSON object: `{a: v}`, `{a: [v..]}` or `{a: {mod: v}}`.
    fn push_json(&mut self, obj: &serde_json::Map<String, Value>) -> Result<(), ApiError> {
        for (raw_field, v) in obj {
            let field = self.field(raw_field)?;
            match v {
                Value::Array(items) => self.criteria.push(field, Condition::In(items.clone())),
                Value::Object(mods) => {
                    for (m, mv) in mods {
                        let c = self.condition(m, mv.clone())?;
                        self.criteria.push(field.clone(), c);
                    }
                }
                other => self.criteria.push(field, Condition::Eq(other.clone())),
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Criteria {
        for (field, values) in self.members {
            self.criteria.push(field, Condition::In(values));
        }
        self.criteria
    }
}

/// Build criteria from every non-directive query pair.
pub fn parse_criteria(
    params: &[(String, String)],
    registry: &SchemaRegistry,
    resource: &ResourceType,
) -> Result<Criteria, ApiError> {
    let mut builder = CriteriaBuilder {
        registry,
        resource,
        criteria: Criteria::new(),
        members: IndexMap::new(),
    };
    for (key, raw) in params {
        let Some((base, brackets)) = split_key(key) else {
            return Err(ApiError::BadRequest(format!("malformed query key '{}'", key)));
        };
        if RESERVED.contains(&base) {
            continue;
        }
        if base == "where" {
            match brackets.as_slice() {
                [] => {
                    let parsed: Value = serde_json::from_str(raw)
                        .map_err(|e| ApiError::BadRequest(format!("invalid where: {}", e)))?;
                    let Value::Object(obj) = parsed else {
                        return Err(ApiError::BadRequest("where must be a JSON object".into()));
                    };
                    builder.push_json(&obj)?;
                }
                [field] => builder.push_raw(field, None, raw)?,
                [field, modifier] => builder.push_raw(field, Some(modifier), raw)?,
                _ => return Err(ApiError::BadRequest(format!("malformed query key '{}'", key))),
            }
            continue;
        }
        match brackets.as_slice() {
            [] => builder.push_raw(base, None, raw)?,
            [modifier] => builder.push_raw(base, Some(modifier), raw)?,
            _ => return Err(ApiError::BadRequest(format!("malformed query key '{}'", key))),
        }
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::tests::registry;
    use serde_json::json;
    use yare::parameterized;

    fn parse(pairs: &[(&str, &str)]) -> Result<Criteria, ApiError> {
        let r = registry();
        let params: Vec<(String, String)> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        parse_criteria(&params, &r, r.get("author").unwrap())
    }

    #[test]
    fn test_equality_coerced_by_type() {
        let c = parse(&[("name", "Bob"), ("age", "46"), ("limit", "3")]).unwrap();
        assert_eq!(
            c.conditions,
            vec![
                ("name".to_string(), Condition::Eq(json!("Bob"))),
                ("age".to_string(), Condition::Eq(json!(46))),
            ]
        );
    }

    #[parameterized(
        contains = { "name[contains]", "ob", Condition::Contains("ob".into()) },
        starts = { "name[startsWith]", "B", Condition::StartsWith("B".into()) },
        less = { "age[<]", "50", Condition::Lt(json!(50)) },
        less_word = { "age[lessThan]", "50", Condition::Lt(json!(50)) },
        gte = { "age[>=]", "18", Condition::Gte(json!(18)) },
        not = { "name[!=]", "Al", Condition::Ne(json!("Al")) },
        where_bracket = { "where[age][>]", "7", Condition::Gt(json!(7)) },
        in_list = { "age[in]", "1,2", Condition::In(vec![json!(1), json!(2)]) },
    )]
    fn test_modifiers(key: &str, value: &str, expected: Condition) {
        let c = parse(&[(key, value)]).unwrap();
        assert_eq!(c.conditions[0].1, expected);
    }

    #[test]
    fn test_membership_and_ids() {
        let c = parse(&[("name[]", "a"), ("name[]", "b"), ("ids", "1,2")]).unwrap();
        assert_eq!(
            c.conditions,
            vec![
                ("name".to_string(), Condition::In(vec![json!("a"), json!("b")])),
                ("id".to_string(), Condition::In(vec![json!(1), json!(2)])),
            ]
        );
    }

    #[test]
    fn test_where_json() {
        let c = parse(&[("where", r#"{"name":{"contains":"o"},"age":[1,2],"id":3}"#)]).unwrap();
        assert_eq!(
            c.conditions,
            vec![
                ("name".to_string(), Condition::Contains("o".into())),
                ("age".to_string(), Condition::In(vec![json!(1), json!(2)])),
                ("id".to_string(), Condition::Eq(json!(3))),
            ]
        );
    }

    #[parameterized(
        unknown_attribute = { "nope", "1" },
        bad_number = { "age", "old" },
        bad_modifier = { "age[between]", "1" },
        bad_where = { "where", "[1]" },
    )]
    fn test_rejected(key: &str, value: &str) {
        assert!(matches!(parse(&[(key, value)]), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_foreign_key_takes_target_key_type() {
        let r = registry();
        let params = vec![("author".to_string(), "2".to_string())];
        let c = parse_criteria(&params, &r, r.get("article").unwrap()).unwrap();
        assert_eq!(c.conditions[0].1, Condition::Eq(json!(2)));
    }

    #[test]
    fn test_coerce_key() {
        let r = registry();
        assert_eq!(coerce_key(r.get("author").unwrap(), "7"), Some(json!(7)));
        assert_eq!(coerce_key(r.get("author").unwrap(), "x"), None);
    }
}
