//! `sort` directive. Accepted forms, all equivalent when they name the same keys:
//! `name ASC, age DESC`, `-age`, `{"name":1,"age":-1}`, `[{"name":"ASC"},{"age":"DESC"}]`.

use crate::case::to_camel_case;
use crate::config::ResourceType;
use crate::error::ApiError;
use crate::store::{Direction, SortKey};
use serde_json::Value;

fn field(resource: &ResourceType, raw: &str) -> Result<String, ApiError> {
    let name = to_camel_case(raw.trim());
    if resource.has_column(&name) {
        Ok(name)
    } else {
        Err(ApiError::BadRequest(format!("cannot sort by unknown attribute '{}'", raw.trim())))
    }
}

fn direction(v: &Value) -> Result<Direction, ApiError> {
    match v {
        Value::Number(n) if n.as_i64() == Some(1) => Ok(Direction::Asc),
        Value::Number(n) if n.as_i64() == Some(-1) => Ok(Direction::Desc),
        Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(Direction::Asc),
        Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(Direction::Desc),
        other => Err(ApiError::BadRequest(format!("invalid sort direction {}", other))),
    }
}

fn from_object(resource: &ResourceType, obj: &serde_json::Map<String, Value>, out: &mut Vec<SortKey>) -> Result<(), ApiError> {
    for (k, v) in obj {
        out.push(SortKey {
            field: field(resource, k)?,
            direction: direction(v)?,
        });
    }
    Ok(())
}

pub fn parse_sort(raw: Option<&str>, resource: &ResourceType) -> Result<Vec<SortKey>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    let mut keys = Vec::new();
    if raw.starts_with('{') || raw.starts_with('[') {
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|e| ApiError::BadRequest(format!("invalid sort: {}", e)))?;
        match parsed {
            Value::Object(obj) => from_object(resource, &obj, &mut keys)?,
            Value::Array(items) => {
                for item in items {
                    let Value::Object(obj) = item else {
                        return Err(ApiError::BadRequest("sort array entries must be objects".into()));
                    };
                    from_object(resource, &obj, &mut keys)?;
                }
            }
            _ => return Err(ApiError::BadRequest("invalid sort".into())),
        }
        return Ok(keys);
    }

    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(name) = part.strip_prefix('-') {
            keys.push(SortKey::desc(field(resource, name)?));
            continue;
        }
        let mut words = part.split_whitespace();
        let name = words.next().unwrap_or_default();
        let dir = match words.next() {
            None => Direction::Asc,
            Some(d) => direction(&Value::String(d.to_string()))?,
        };
        if words.next().is_some() {
            return Err(ApiError::BadRequest(format!("invalid sort clause '{}'", part)));
        }
        keys.push(SortKey {
            field: field(resource, name)?,
            direction: dir,
        });
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::tests::registry;
    use yare::parameterized;

    #[parameterized(
        clause_list = { "identiField ASC, name ASC" },
        default_direction = { "identiField,name" },
        wire_case = { "identi-field asc,name" },
        json_object = { r#"{"identiField":1,"name":"ASC"}"# },
        json_array = { r#"[{"identiField":"ASC"},{"name":"ASC"}]"# },
    )]
    fn test_sort_forms_are_equivalent(raw: &str) {
        let r = registry();
        let keys = parse_sort(Some(raw), r.get("bar").unwrap()).unwrap();
        assert_eq!(keys, vec![SortKey::asc("identiField"), SortKey::asc("name")]);
    }

    #[parameterized(
        minus = { "-name" },
        clause = { "name DESC" },
        json = { r#"{"name":-1}"# },
    )]
    fn test_descending(raw: &str) {
        let r = registry();
        let keys = parse_sort(Some(raw), r.get("bar").unwrap()).unwrap();
        assert_eq!(keys, vec![SortKey::desc("name")]);
    }

    #[parameterized(
        unknown_field = { "nope ASC" },
        bad_direction = { "name sideways" },
        bad_json = { "{name" },
    )]
    fn test_rejected(raw: &str) {
        let r = registry();
        assert!(matches!(
            parse_sort(Some(raw), r.get("bar").unwrap()),
            Err(ApiError::BadRequest(_))
        ));
    }
}
