//! Blueprint actions: find, findOne, populate (relationship endpoint), create, update, destroy.
//! Each action parses directives, plans population, fetches, counts and assembles.

use crate::association::{self, PresentationContext, ResolvedAssociation};
use crate::case::{object_keys_to_camel_case, to_camel_case, to_kebab_case};
use crate::config::{AssociationKind, Cardinality, PresentationMode, ResourceType};
use crate::counter::{CountBatch, CountOutcome, RelationshipCounter};
use crate::directive::{coerce_key, Directives, FieldProjection};
use crate::document::{Assembler, DataShape, ResourceDocument};
use crate::error::ApiError;
use crate::planner::{self, PopulationPlan};
use crate::service::RequestValidator;
use crate::state::AppState;
use crate::store::{key_string, Condition, Criteria, FetchedRecord, FindQuery, Populate, Record};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

pub struct BlueprintService;

/// Everything the fetch and assembly stages need for one primary type.
struct Rendering<'a> {
    resource: &'a ResourceType,
    resolved: Vec<ResolvedAssociation<'a>>,
    plan: PopulationPlan,
    fields: &'a FieldProjection,
}

impl<'a> Rendering<'a> {
    fn new(state: &'a AppState, resource: &'a ResourceType, directives: &'a Directives, ctx: PresentationContext) -> Self {
        let resolved = association::resolve(
            &state.registry.presentation,
            resource,
            directives.include.aliases(),
            ctx,
        );
        let plan = planner::plan(&resolved, &directives.fields, &state.registry);
        Rendering {
            resource,
            resolved,
            plan,
            fields: &directives.fields,
        }
    }

    fn query(&self, criteria: Criteria) -> FindQuery {
        FindQuery {
            criteria,
            select: self.fields.select_for(self.resource),
            populate: self.plan.populate.clone(),
            ..FindQuery::default()
        }
    }

    /// One batch per primary association over the primary keys, then one per association of
    /// each sideloaded type over the keys of its included records.
    fn count_batches(&self, state: &AppState, records: &[FetchedRecord], keys: &[Value]) -> Vec<CountBatch> {
        let mut batches = Vec::new();
        if keys.is_empty() {
            return batches;
        }
        batches.extend(self.resolved.iter().map(|a| CountBatch {
            identity: self.resource.identity.clone(),
            alias: a.alias().to_string(),
            keys: keys.to_vec(),
        }));

        let mut included: IndexMap<&str, (&ResourceType, Vec<Value>, HashSet<String>)> = IndexMap::new();
        for a in self.resolved.iter().filter(|a| a.mode == PresentationMode::Record) {
            let Some(target) = state.registry.get(&a.descriptor.target) else { continue };
            for fetched in records {
                let Some(populated) = fetched.populated.get(a.alias()) else { continue };
                for related in populated.records() {
                    let Some(pk) = related.get(&target.primary_key) else { continue };
                    let (_, keys, seen) = included
                        .entry(target.identity.as_str())
                        .or_insert_with(|| (target, Vec::new(), HashSet::new()));
                    if seen.insert(key_string(pk)) {
                        keys.push(pk.clone());
                    }
                }
            }
        }
        for (target, keys, _) in included.into_values() {
            batches.extend(target.associations.iter().map(|assoc| CountBatch {
                identity: target.identity.clone(),
                alias: assoc.alias.clone(),
                keys: keys.clone(),
            }));
        }
        batches
    }

    /// Count every relationship of every primary and included record, run index loads, then assemble.
    async fn document(
        &self,
        state: &AppState,
        records: &[FetchedRecord],
        shape: DataShape,
        total: Option<u64>,
        self_link: String,
    ) -> Result<ResourceDocument, ApiError> {
        let keys: Vec<Value> = records
            .iter()
            .filter_map(|r| r.record.get(&self.resource.primary_key).cloned())
            .collect();
        let batches = self.count_batches(state, records, &keys);
        let counter = RelationshipCounter::new(state.store.as_ref(), &state.registry, &state.junctions);
        let (counts, indexes) = tokio::join!(
            counter.count_all(batches, state.settings.count_concurrency),
            planner::load_indexes(state.store.as_ref(), &state.registry, &self.plan.index_loads, &keys),
        );
        let indexes = indexes?;
        let assembler = Assembler {
            registry: &state.registry,
            links: &state.links,
            resource: self.resource,
            resolved: &self.resolved,
            projection: self.fields,
            counts: &counts,
            indexes: &indexes,
        };
        Ok(assembler.document(records, shape, total, self_link))
    }
}

/// A parsed JSON:API write body.
struct WriteBody {
    id: Option<Value>,
    values: Record,
    collections: Vec<(String, Vec<Value>)>,
}

fn resource<'a>(state: &'a AppState, plural: &str) -> Result<&'a ResourceType, ApiError> {
    state
        .registry
        .by_plural(plural)
        .ok_or_else(|| ApiError::NotFound(format!("resource type {}", plural)))
}

fn primary_key(resource: &ResourceType, id: &str) -> Result<Value, ApiError> {
    coerce_key(resource, id).ok_or_else(|| ApiError::NotFound(format!("{} {}", resource.wire_type, id)))
}

/// Resource identifier `{type, id}` of `target` -> key value.
fn identifier_key(target: &ResourceType, v: &Value) -> Result<Value, ApiError> {
    let Value::Object(obj) = v else {
        return Err(ApiError::BadRequest("relationship data must be a resource identifier".into()));
    };
    match obj.get("type").and_then(Value::as_str) {
        Some(t) if t == target.wire_type => {}
        Some(t) => {
            return Err(ApiError::Conflict(format!(
                "relationship type {} does not match {}",
                t, target.wire_type
            )))
        }
        None => return Err(ApiError::BadRequest("resource identifier without type".into())),
    }
    let id = obj
        .get("id")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ApiError::BadRequest("resource identifier without id".into()))?;
    coerce_key(target, &key_string(id))
        .ok_or_else(|| ApiError::Validation(format!("invalid {} id {}", target.wire_type, id)))
}

fn parse_body(state: &AppState, resource: &ResourceType, body: &Value) -> Result<WriteBody, ApiError> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::BadRequest("request body must contain a data object".into()))?;
    match data.get("type").and_then(Value::as_str) {
        Some(t) if t == resource.wire_type => {}
        Some(t) => {
            return Err(ApiError::Conflict(format!(
                "type {} does not match endpoint type {}",
                t, resource.wire_type
            )))
        }
        None => return Err(ApiError::BadRequest("data.type is required".into())),
    }
    let id = match data.get("id").filter(|v| !v.is_null()) {
        Some(v) => Some(
            coerce_key(resource, &key_string(v))
                .ok_or_else(|| ApiError::Validation(format!("invalid id {}", v)))?,
        ),
        None => None,
    };

    let mut values = Record::new();
    if let Some(attrs) = data.get("attributes") {
        let attrs = attrs
            .as_object()
            .ok_or_else(|| ApiError::BadRequest("data.attributes must be an object".into()))?;
        for (name, v) in object_keys_to_camel_case(attrs) {
            if name == resource.primary_key || resource.attribute(&name).is_none() {
                return Err(ApiError::Validation(format!("unknown attribute '{}'", to_kebab_case(&name))));
            }
            values.insert(name, v);
        }
    }

    let mut collections = Vec::new();
    if let Some(rels) = data.get("relationships") {
        let rels = rels
            .as_object()
            .ok_or_else(|| ApiError::BadRequest("data.relationships must be an object".into()))?;
        for (name, rel) in rels {
            let alias = to_camel_case(name);
            let assoc = resource
                .association(&alias)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown relationship '{}'", name)))?;
            let target = state
                .registry
                .get(&assoc.target)
                .ok_or_else(|| ApiError::Internal(format!("unregistered type {}", assoc.target)))?;
            let linkage = rel
                .get("data")
                .ok_or_else(|| ApiError::BadRequest(format!("relationship '{}' needs data", name)))?;
            match (&assoc.kind, linkage) {
                (AssociationKind::BelongsToOne, Value::Null) => {
                    values.insert(alias, Value::Null);
                }
                (AssociationKind::BelongsToOne, v) => {
                    values.insert(alias, identifier_key(target, v)?);
                }
                (_, Value::Array(items)) => {
                    let ids = items
                        .iter()
                        .map(|v| identifier_key(target, v))
                        .collect::<Result<Vec<_>, _>>()?;
                    collections.push((alias, ids));
                }
                _ => {
                    return Err(ApiError::BadRequest(format!(
                        "relationship '{}' expects an array of resource identifiers",
                        name
                    )))
                }
            }
        }
    }
    Ok(WriteBody { id, values, collections })
}

impl BlueprintService {
    /// GET /:resource
    pub async fn find(
        state: &AppState,
        plural: &str,
        params: &[(String, String)],
    ) -> Result<ResourceDocument, ApiError> {
        let resource = resource(state, plural)?;
        let directives = Directives::parse(params, &state.registry, resource, &state.settings)?;
        let rendering = Rendering::new(state, resource, &directives, PresentationContext::List);
        let query = FindQuery {
            sort: directives.sort.clone(),
            skip: directives.skip,
            limit: Some(directives.limit),
            ..rendering.query(directives.criteria.clone())
        };
        tracing::debug!(resource = %resource.identity, skip = query.skip, limit = ?query.limit, "find");
        let (records, total) = tokio::try_join!(
            state.store.find(resource, &query),
            state.store.count(resource, &directives.criteria),
        )?;
        rendering
            .document(state, &records, DataShape::Many, Some(total), state.links.collection(&resource.plural))
            .await
    }

    /// GET /:resource/:id
    pub async fn find_one(
        state: &AppState,
        plural: &str,
        id: &str,
        params: &[(String, String)],
    ) -> Result<ResourceDocument, ApiError> {
        let resource = resource(state, plural)?;
        let pk = primary_key(resource, id)?;
        let directives = Directives::parse(params, &state.registry, resource, &state.settings)?;
        Self::show(state, resource, &pk, &directives).await
    }

    async fn show(
        state: &AppState,
        resource: &ResourceType,
        pk: &Value,
        directives: &Directives,
    ) -> Result<ResourceDocument, ApiError> {
        let rendering = Rendering::new(state, resource, directives, PresentationContext::Detail);
        let query = FindQuery {
            limit: Some(1),
            ..rendering.query(Criteria::new().and(resource.primary_key.clone(), Condition::Eq(pk.clone())))
        };
        let records = state.store.find(resource, &query).await?;
        if records.is_empty() {
            return Err(ApiError::NotFound(format!("{} {}", resource.wire_type, key_string(pk))));
        }
        let self_link = state.links.resource(&resource.plural, &key_string(pk));
        rendering
            .document(state, &records, DataShape::One, None, self_link)
            .await
    }

    /// GET /:resource/:id/:relation. Directives apply to the related type; `meta.total` is the
    /// relationship count, unaffected by filters and pagination.
    pub async fn populate(
        state: &AppState,
        plural: &str,
        id: &str,
        relation: &str,
        params: &[(String, String)],
    ) -> Result<ResourceDocument, ApiError> {
        let parent = resource(state, plural)?;
        let pk = primary_key(parent, id)?;
        let alias = to_camel_case(relation);
        let assoc = parent
            .association(&alias)
            .ok_or_else(|| ApiError::NotFound(format!("relationship {}.{}", plural, relation)))?;
        let target = state
            .registry
            .get(&assoc.target)
            .ok_or_else(|| ApiError::Internal(format!("unregistered type {}", assoc.target)))?;
        let directives = Directives::parse(params, &state.registry, target, &state.settings)?;

        let children = Populate {
            select: Some(Vec::new()),
            criteria: directives.criteria.clone(),
            sort: directives.sort.clone(),
            skip: directives.skip,
            limit: Some(directives.limit),
            ..Populate::new(alias.clone())
        };
        let parent_row = state
            .store
            .find_one(parent, &pk, std::slice::from_ref(&children))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", parent.wire_type, id)))?;
        let ids: Vec<Value> = parent_row
            .populated
            .get(&alias)
            .map(|p| {
                p.records()
                    .into_iter()
                    .filter_map(|r| r.get(&target.primary_key).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let (shape, ctx) = match assoc.cardinality() {
            Cardinality::One => (DataShape::One, PresentationContext::Detail),
            Cardinality::Many => (DataShape::Many, PresentationContext::List),
        };
        let rendering = Rendering::new(state, target, &directives, ctx);
        let records = if ids.is_empty() {
            Vec::new()
        } else {
            let query = FindQuery {
                sort: directives.sort.clone(),
                ..rendering.query(Criteria::new().and(target.primary_key.clone(), Condition::In(ids)))
            };
            state.store.find(target, &query).await?
        };

        let total = match shape {
            DataShape::One => None,
            DataShape::Many => {
                let counter = RelationshipCounter::new(state.store.as_ref(), &state.registry, &state.junctions);
                match counter.count(parent, &alias, &pk).await {
                    CountOutcome::Counted(n) => Some(n),
                    CountOutcome::Failed(_) => None,
                }
            }
        };
        let self_link = state.links.related(&parent.plural, id, &to_kebab_case(&alias));
        rendering
            .document(state, &records, shape, total, self_link)
            .await
    }

    /// POST /:resource
    pub async fn create(state: &AppState, plural: &str, body: &Value) -> Result<ResourceDocument, ApiError> {
        let resource = resource(state, plural)?;
        let WriteBody { id, mut values, collections } = parse_body(state, resource, body)?;
        if let Some(id) = id {
            values.insert(resource.primary_key.clone(), id);
        }
        RequestValidator::validate(resource, &values)?;
        let created = state.store.create(resource, &values).await?;
        let pk = created
            .get(&resource.primary_key)
            .cloned()
            .ok_or_else(|| ApiError::Internal("created record has no primary key".into()))?;
        for (alias, ids) in &collections {
            state.store.replace_collection(resource, &pk, alias, ids).await?;
        }
        tracing::debug!(resource = %resource.identity, id = %key_string(&pk), "created");
        Self::show(state, resource, &pk, &Directives::default()).await
    }

    /// PATCH /:resource/:id
    pub async fn update(
        state: &AppState,
        plural: &str,
        id: &str,
        body: &Value,
    ) -> Result<ResourceDocument, ApiError> {
        let resource = resource(state, plural)?;
        let pk = primary_key(resource, id)?;
        let WriteBody { id: body_id, values, collections } = parse_body(state, resource, body)?;
        if let Some(body_id) = body_id {
            if key_string(&body_id) != key_string(&pk) {
                return Err(ApiError::Conflict(format!(
                    "body id {} does not match endpoint id {}",
                    key_string(&body_id),
                    id
                )));
            }
        }
        RequestValidator::validate_partial(resource, &values)?;
        state
            .store
            .update(resource, &pk, &values)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", resource.wire_type, id)))?;
        for (alias, ids) in &collections {
            state.store.replace_collection(resource, &pk, alias, ids).await?;
        }
        tracing::debug!(resource = %resource.identity, id = %id, "updated");
        Self::show(state, resource, &pk, &Directives::default()).await
    }

    /// DELETE /:resource/:id
    pub async fn destroy(state: &AppState, plural: &str, id: &str) -> Result<(), ApiError> {
        let resource = resource(state, plural)?;
        let pk = primary_key(resource, id)?;
        state
            .store
            .destroy(resource, &pk)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", resource.wire_type, id)))?;
        tracing::debug!(resource = %resource.identity, id = %id, "destroyed");
        Ok(())
    }
}
