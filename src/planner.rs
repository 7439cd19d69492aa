//! Decide what to join for a request: populates for fully presented relations, identifier-only
//! loads for `index` relations, nothing for links.

use crate::association::ResolvedAssociation;
use crate::config::{AssociationKind, PresentationMode, SchemaRegistry};
use crate::directive::FieldProjection;
use crate::error::StoreError;
use crate::store::{key_string, Condition, Criteria, FindQuery, Populate, Store};
use serde_json::Value;
use std::collections::HashMap;

/// Identifier-only fetch on `target`, grouped by its `via` back-reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexLoad {
    pub alias: String,
    pub target: String,
    pub via: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationPlan {
    pub populate: Vec<Populate>,
    pub index_loads: Vec<IndexLoad>,
}

/// alias -> owner key string -> related identifiers.
pub type IndexResults = HashMap<String, HashMap<String, Vec<Value>>>;

pub fn plan(
    resolved: &[ResolvedAssociation<'_>],
    projection: &FieldProjection,
    registry: &SchemaRegistry,
) -> PopulationPlan {
    let mut out = PopulationPlan::default();
    for a in resolved {
        let d = a.descriptor;
        if a.populate {
            let select = match a.mode {
                PresentationMode::Record => registry.get(&d.target).and_then(|t| projection.select_for(t)),
                _ => Some(Vec::new()),
            };
            out.populate.push(Populate {
                select,
                ..Populate::new(d.alias.clone())
            });
            continue;
        }
        if a.mode == PresentationMode::Index {
            if let AssociationKind::DirectMany { via } = &d.kind {
                out.index_loads.push(IndexLoad {
                    alias: d.alias.clone(),
                    target: d.target.clone(),
                    via: via.clone(),
                });
            }
        }
    }
    tracing::debug!(
        populate = out.populate.len(),
        index_loads = out.index_loads.len(),
        "population plan"
    );
    out
}

/// Run every index load for the owner keys.
pub async fn load_indexes(
    store: &dyn Store,
    registry: &SchemaRegistry,
    loads: &[IndexLoad],
    keys: &[Value],
) -> Result<IndexResults, StoreError> {
    let mut results = IndexResults::new();
    if keys.is_empty() {
        return Ok(results);
    }
    for load in loads {
        let target = registry
            .get(&load.target)
            .ok_or_else(|| StoreError::UnknownType(load.target.clone()))?;
        let query = FindQuery {
            criteria: Criteria::new().and(load.via.clone(), Condition::In(keys.to_vec())),
            select: Some(vec![load.via.clone()]),
            ..FindQuery::default()
        };
        let rows = store.find(target, &query).await?;
        let grouped = results.entry(load.alias.clone()).or_default();
        for row in rows {
            let (Some(owner), Some(id)) = (row.record.get(&load.via), row.record.get(&target.primary_key)) else {
                continue;
            };
            grouped.entry(key_string(owner)).or_default().push(id.clone());
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{resolve, PresentationContext};
    use crate::config::{resolve as resolve_registry, FullConfig};
    use crate::directive::parse_fields;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn registry(list: &str) -> SchemaRegistry {
        resolve_registry(&FullConfig {
            models: serde_json::from_value(json!([
                { "identity": "article", "attributes": {
                    "title": { "type": "string" },
                    "author": { "model": "author" },
                    "comments": { "collection": "comment", "via": "article" }
                } },
                { "identity": "author", "attributes": {
                    "name": { "type": "string" },
                    "age": { "type": "number" }
                } },
                { "identity": "comment", "attributes": {
                    "text": { "type": "string" },
                    "article": { "model": "article" }
                } }
            ]))
            .unwrap(),
            blueprints: serde_json::from_value(json!({ "presentation": { "list": list } })).unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn test_include_populates_with_projection() {
        let r = registry("link");
        let article = r.get("article").unwrap();
        let include = vec!["author".to_string()];
        let resolved = resolve(&r.presentation, article, &include, PresentationContext::List);
        let projection = parse_fields(
            &[("authors".to_string(), "name".to_string())],
            article,
            &[r.get("author").unwrap()],
        );
        let p = plan(&resolved, &projection, &r);
        assert_eq!(
            p.populate,
            vec![Populate {
                select: Some(vec!["name".to_string()]),
                ..Populate::new("author")
            }]
        );
        assert!(p.index_loads.is_empty());
    }

    #[test]
    fn test_index_mode_loads_identifiers_only() {
        let r = registry("index");
        let article = r.get("article").unwrap();
        let resolved = resolve(&r.presentation, article, &[], PresentationContext::List);
        let p = plan(&resolved, &FieldProjection::default(), &r);
        assert!(p.populate.is_empty());
        assert_eq!(
            p.index_loads,
            vec![IndexLoad {
                alias: "comments".into(),
                target: "comment".into(),
                via: "article".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_load_indexes_groups_by_owner() {
        let r = Arc::new(registry("index"));
        let store = MemoryStore::new(r.clone());
        store
            .seed(
                "comment",
                json!([{ "text": "a", "article": 1 }, { "text": "b", "article": 2 }, { "text": "c", "article": 1 }]),
            )
            .unwrap();
        let loads = vec![IndexLoad {
            alias: "comments".into(),
            target: "comment".into(),
            via: "article".into(),
        }];
        let out = load_indexes(&store, &r, &loads, &[json!(1), json!(2), json!(3)]).await.unwrap();
        assert_eq!(out["comments"]["1"], vec![json!(1), json!(3)]);
        assert_eq!(out["comments"]["2"], vec![json!(2)]);
        assert!(!out["comments"].contains_key("3"));
    }
}
