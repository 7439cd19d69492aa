//! Request directives: include, sparse fieldsets, sort, pagination and filters. Parsed
//! synchronously before any storage access; a bad directive fails the request with 400.

mod criteria;
mod fields;
mod include;
mod sort;

pub use criteria::{coerce_key, coerce_value, parse_criteria};
pub use fields::{parse_fields, FieldProjection};
pub use include::{parse_include, IncludeRequest};
pub use sort::parse_sort;

use crate::config::{BlueprintsConfig, ResourceType, SchemaRegistry};
use crate::error::ApiError;
use crate::store::{Criteria, SortKey};

#[derive(Clone, Debug, Default)]
pub struct Directives {
    pub include: IncludeRequest,
    pub fields: FieldProjection,
    pub sort: Vec<SortKey>,
    pub criteria: Criteria,
    pub skip: u64,
    pub limit: u64,
}

fn last<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Non-negative integer that still fits a signed 64-bit `OFFSET`/`LIMIT`.
fn number(params: &[(String, String)], key: &str) -> Result<Option<u64>, ApiError> {
    last(params, key)
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .ok()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| ApiError::BadRequest(format!("{} must be a non-negative integer", key)))
        })
        .transpose()
}

impl Directives {
    /// Parse every directive for `resource` from raw query pairs (repeated keys preserved).
    pub fn parse(
        params: &[(String, String)],
        registry: &SchemaRegistry,
        resource: &ResourceType,
        settings: &BlueprintsConfig,
    ) -> Result<Self, ApiError> {
        let include = parse_include(last(params, "include"), resource)?;
        let included: Vec<&ResourceType> = include
            .aliases()
            .iter()
            .filter_map(|alias| resource.association(alias))
            .filter_map(|a| registry.get(&a.target))
            .collect();
        let field_pairs: Vec<(String, String)> = params
            .iter()
            .filter_map(|(k, v)| {
                let plural = k.strip_prefix("fields[")?.strip_suffix(']')?;
                Some((plural.to_string(), v.clone()))
            })
            .collect();
        let fields = parse_fields(&field_pairs, resource, &included);
        let sort = parse_sort(last(params, "sort"), resource)?;
        let criteria = parse_criteria(params, registry, resource)?;
        let limit = number(params, "limit")?
            .unwrap_or(settings.default_limit as u64)
            .min(settings.max_limit as u64);
        let skip = number(params, "skip")?.unwrap_or(0);
        Ok(Directives {
            include,
            fields,
            sort,
            criteria,
            skip,
            limit,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::Condition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Foo/bar many-to-many, article/author/comment, author/publisher many-to-many.
    pub(crate) fn registry() -> SchemaRegistry {
        resolve(&FullConfig {
            models: serde_json::from_value(json!([
                { "identity": "foo", "attributes": {
                    "name": { "type": "string" },
                    "bars": { "collection": "bar", "via": "foos" },
                    "myBar": { "model": "bar" }
                } },
                { "identity": "bar", "attributes": {
                    "name": { "type": "string" },
                    "identiField": { "type": "string" },
                    "foos": { "collection": "foo", "via": "bars" },
                    "myFoo": { "model": "foo" }
                } },
                { "identity": "article", "attributes": {
                    "title": { "type": "string" },
                    "body": { "type": "string" },
                    "author": { "model": "author" },
                    "comments": { "collection": "comment", "via": "article" }
                } },
                { "identity": "author", "attributes": {
                    "name": { "type": "string" },
                    "age": { "type": "number" },
                    "articles": { "collection": "article", "via": "author" },
                    "comments": { "collection": "comment", "via": "author" },
                    "publishers": { "collection": "publisher", "via": "authors" }
                } },
                { "identity": "comment", "attributes": {
                    "text": { "type": "string" },
                    "author": { "model": "author" },
                    "article": { "model": "article" }
                } },
                { "identity": "publisher", "attributes": {
                    "name": { "type": "string" },
                    "authors": { "collection": "author", "via": "publishers" }
                } }
            ]))
            .unwrap(),
            ..FullConfig::default()
        })
        .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_all_directives() {
        let r = registry();
        let d = Directives::parse(
            &params(&[
                ("include", "author"),
                ("fields[articles]", "title"),
                ("fields[authors]", "name"),
                ("sort", "-title"),
                ("limit", "5000"),
                ("skip", "2"),
                ("title[contains]", "rust"),
            ]),
            &r,
            r.get("article").unwrap(),
            &BlueprintsConfig::default(),
        )
        .unwrap();
        assert!(d.include.contains("author"));
        assert_eq!(d.fields.get("author"), Some(&["name".to_string()][..]));
        assert_eq!(d.sort, vec![SortKey::desc("title")]);
        assert_eq!(d.limit, 1000);
        assert_eq!(d.skip, 2);
        assert_eq!(
            d.criteria.conditions,
            vec![("title".to_string(), Condition::Contains("rust".into()))]
        );
    }

    #[test]
    fn test_fields_of_non_included_type_ignored() {
        let r = registry();
        let d = Directives::parse(
            &params(&[("fields[authors]", "name")]),
            &r,
            r.get("article").unwrap(),
            &BlueprintsConfig::default(),
        )
        .unwrap();
        assert_eq!(d.fields.get("author"), None);
        assert_eq!(d.limit, 100);
    }

    #[test]
    fn test_bad_limit() {
        let r = registry();
        let err = Directives::parse(
            &params(&[("limit", "-1")]),
            &r,
            r.get("article").unwrap(),
            &BlueprintsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_skip_beyond_signed_range() {
        let r = registry();
        let article = r.get("article").unwrap();
        let settings = BlueprintsConfig::default();
        let err = Directives::parse(&params(&[("skip", "9223372036854775808")]), &r, article, &settings)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let d = Directives::parse(&params(&[("skip", "9223372036854775807")]), &r, article, &settings).unwrap();
        assert_eq!(d.skip, i64::MAX as u64);
    }
}
