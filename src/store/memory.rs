//! In-process store over the schema registry. Used by tests and the demo server when no
//! database is configured.

use super::{
    key_string, Condition, Criteria, FetchedRecord, FindQuery, Populate, Populated, Record,
    SortKey, Store, Direction,
};
use crate::config::{AssociationKind, ResourceType, SchemaRegistry};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
}

pub struct MemoryStore {
    registry: Arc<SchemaRegistry>,
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        MemoryStore {
            registry,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Insert fixture rows (a JSON array of objects) for `identity`.
    pub fn seed(&self, identity: &str, rows: Value) -> Result<(), StoreError> {
        let resource = self.resource(identity)?;
        let Value::Array(rows) = rows else {
            return Err(StoreError::InvalidValue("seed rows must be an array".into()));
        };
        for row in rows {
            let Value::Object(row) = row else {
                return Err(StoreError::InvalidValue("seed row must be an object".into()));
            };
            self.insert(resource, &row)?;
        }
        Ok(())
    }

    /// Relate `pk` to `ids` through a to-many association (fixtures).
    pub fn seed_relation(
        &self,
        identity: &str,
        pk: Value,
        alias: &str,
        ids: Vec<Value>,
    ) -> Result<(), StoreError> {
        let resource = self.resource(identity)?;
        self.relate(resource, &pk, alias, &ids)
    }

    fn resource(&self, identity: &str) -> Result<&ResourceType, StoreError> {
        self.registry
            .get(identity)
            .ok_or_else(|| StoreError::UnknownType(identity.to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("table lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("table lock poisoned".into()))
    }

    fn insert(&self, resource: &ResourceType, values: &Record) -> Result<Record, StoreError> {
        for key in values.keys() {
            if !resource.has_column(key) {
                return Err(StoreError::InvalidValue(format!(
                    "unknown attribute '{}' for {}",
                    key, resource.identity
                )));
            }
        }
        let mut tables = self.write()?;
        let table = tables.entry(resource.identity.clone()).or_default();
        let mut row = values.clone();
        let pk = &resource.primary_key;
        if row.get(pk).map(Value::is_null).unwrap_or(true) {
            let next = table
                .rows
                .iter()
                .filter_map(|r| r.get(pk).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(pk.clone(), Value::from(next));
        }
        check_unique(resource, &table.rows, &row, None)?;
        table.rows.push(row.clone());
        Ok(row)
    }

    fn relate(
        &self,
        resource: &ResourceType,
        pk: &Value,
        alias: &str,
        ids: &[Value],
    ) -> Result<(), StoreError> {
        let assoc = resource
            .association(alias)
            .ok_or_else(|| StoreError::UnknownAssociation {
                resource: resource.identity.clone(),
                alias: alias.to_string(),
            })?;
        match &assoc.kind {
            AssociationKind::BelongsToOne => Err(StoreError::InvalidValue(format!(
                "{} is not a to-many association",
                alias
            ))),
            AssociationKind::DirectMany { via } => {
                let target = self.resource(&assoc.target)?;
                let wanted: Vec<String> = ids.iter().map(key_string).collect();
                let mut tables = self.write()?;
                let table = tables.entry(target.identity.clone()).or_default();
                for row in table.rows.iter_mut() {
                    let row_pk = row.get(&target.primary_key).map(key_string);
                    if row_pk.as_ref().map(|k| wanted.contains(k)).unwrap_or(false) {
                        row.insert(via.clone(), pk.clone());
                    } else if row.get(via).map(|v| loose_eq(v, pk)).unwrap_or(false) {
                        row.insert(via.clone(), Value::Null);
                    }
                }
                Ok(())
            }
            AssociationKind::ManyToManyThroughJunction {
                junction,
                owner_column,
                target_column,
            } => {
                let junction = self.resource(junction)?;
                {
                    let mut tables = self.write()?;
                    let table = tables.entry(junction.identity.clone()).or_default();
                    table
                        .rows
                        .retain(|r| !r.get(owner_column).map(|v| loose_eq(v, pk)).unwrap_or(false));
                }
                for id in ids {
                    let mut row = Record::new();
                    row.insert(owner_column.clone(), pk.clone());
                    row.insert(target_column.clone(), id.clone());
                    self.insert(junction, &row)?;
                }
                Ok(())
            }
        }
    }

    fn select_rows(&self, identity: &str, criteria: &Criteria) -> Result<Vec<Record>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .get(identity)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| matches_criteria(r, criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn populate(
        &self,
        resource: &ResourceType,
        row: &Record,
        spec: &Populate,
    ) -> Result<Populated, StoreError> {
        let assoc = resource
            .association(&spec.alias)
            .ok_or_else(|| StoreError::UnknownAssociation {
                resource: resource.identity.clone(),
                alias: spec.alias.clone(),
            })?;
        let target = self.resource(&assoc.target)?;
        let pk = row.get(&resource.primary_key).cloned().unwrap_or(Value::Null);
        let related_criteria = match &assoc.kind {
            AssociationKind::BelongsToOne => {
                let fk = row.get(&assoc.alias).cloned().unwrap_or(Value::Null);
                if fk.is_null() {
                    return Ok(Populated::One(None));
                }
                let found = self
                    .select_rows(&target.identity, &Criteria::new().and(target.primary_key.clone(), Condition::Eq(fk)))?
                    .into_iter()
                    .next()
                    .map(|r| project(target, r, spec.select.as_deref()));
                return Ok(Populated::One(found));
            }
            AssociationKind::DirectMany { via } => {
                let mut c = spec.criteria.clone();
                c.push(via.clone(), Condition::Eq(pk));
                c
            }
            AssociationKind::ManyToManyThroughJunction {
                junction,
                owner_column,
                target_column,
            } => {
                let ids: Vec<Value> = self
                    .select_rows(junction, &Criteria::new().and(owner_column.clone(), Condition::Eq(pk)))?
                    .into_iter()
                    .filter_map(|r| r.get(target_column).cloned())
                    .collect();
                let mut c = spec.criteria.clone();
                c.push(target.primary_key.clone(), Condition::In(ids));
                c
            }
        };
        let mut rows = self.select_rows(&target.identity, &related_criteria)?;
        sort_rows(&mut rows, &spec.sort);
        let rows = paginate(rows, spec.skip, spec.limit)
            .into_iter()
            .map(|r| project(target, r, spec.select.as_deref()))
            .collect();
        Ok(Populated::Many(rows))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(
        &self,
        resource: &ResourceType,
        query: &FindQuery,
    ) -> Result<Vec<FetchedRecord>, StoreError> {
        let mut rows = self.select_rows(&resource.identity, &query.criteria)?;
        sort_rows(&mut rows, &query.sort);
        let rows = paginate(rows, query.skip, query.limit);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fetched = FetchedRecord::default();
            for spec in &query.populate {
                let populated = self.populate(resource, &row, spec)?;
                fetched.populated.insert(spec.alias.clone(), populated);
            }
            fetched.record = project(resource, row, query.select.as_deref());
            out.push(fetched);
        }
        Ok(out)
    }

    async fn count(&self, resource: &ResourceType, criteria: &Criteria) -> Result<u64, StoreError> {
        Ok(self.select_rows(&resource.identity, criteria)?.len() as u64)
    }

    async fn count_grouped(
        &self,
        resource: &ResourceType,
        column: &str,
        keys: &[Value],
    ) -> Result<HashMap<String, u64>, StoreError> {
        let mut counts: HashMap<String, u64> = keys.iter().map(|k| (key_string(k), 0)).collect();
        let tables = self.read()?;
        if let Some(table) = tables.get(&resource.identity) {
            for row in &table.rows {
                let Some(v) = row.get(column).filter(|v| !v.is_null()) else { continue };
                if let Some(n) = counts.get_mut(&key_string(v)) {
                    *n += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn create(&self, resource: &ResourceType, values: &Record) -> Result<Record, StoreError> {
        self.insert(resource, values)
    }

    async fn update(
        &self,
        resource: &ResourceType,
        pk: &Value,
        values: &Record,
    ) -> Result<Option<Record>, StoreError> {
        for key in values.keys() {
            if !resource.has_column(key) {
                return Err(StoreError::InvalidValue(format!(
                    "unknown attribute '{}' for {}",
                    key, resource.identity
                )));
            }
        }
        let mut tables = self.write()?;
        let table = tables.entry(resource.identity.clone()).or_default();
        let Some(index) = table
            .rows
            .iter()
            .position(|r| r.get(&resource.primary_key).map(|v| loose_eq(v, pk)).unwrap_or(false))
        else {
            return Ok(None);
        };
        let mut updated = table.rows[index].clone();
        for (k, v) in values {
            if *k != resource.primary_key {
                updated.insert(k.clone(), v.clone());
            }
        }
        check_unique(resource, &table.rows, &updated, Some(index))?;
        table.rows[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn destroy(&self, resource: &ResourceType, pk: &Value) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let removed = tables.get_mut(&resource.identity).and_then(|table| {
            let index = table
                .rows
                .iter()
                .position(|r| r.get(&resource.primary_key).map(|v| loose_eq(v, pk)).unwrap_or(false))?;
            Some(table.rows.remove(index))
        });
        if removed.is_some() {
            for junction in self.registry.junctions() {
                let Some(sides) = &junction.junction_sides else { continue };
                for side in sides.iter().filter(|s| s.resource == resource.identity) {
                    if let Some(table) = tables.get_mut(&junction.identity) {
                        table
                            .rows
                            .retain(|r| !r.get(&side.column).map(|v| loose_eq(v, pk)).unwrap_or(false));
                    }
                }
            }
        }
        Ok(removed)
    }

    async fn replace_collection(
        &self,
        resource: &ResourceType,
        pk: &Value,
        alias: &str,
        ids: &[Value],
    ) -> Result<(), StoreError> {
        self.relate(resource, pk, alias, ids)
    }
}

fn check_unique(
    resource: &ResourceType,
    rows: &[Record],
    candidate: &Record,
    skip_index: Option<usize>,
) -> Result<(), StoreError> {
    for attr in resource.attributes.iter().filter(|a| a.unique) {
        let Some(v) = candidate.get(&attr.name).filter(|v| !v.is_null()) else { continue };
        let clash = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip_index)
            .any(|(_, r)| r.get(&attr.name).map(|o| loose_eq(o, v)).unwrap_or(false));
        if clash {
            return Err(StoreError::Unique {
                attribute: attr.name.clone(),
            });
        }
    }
    Ok(())
}

/// Keep the primary key plus `select`ed columns; everything when no selection is given.
fn project(resource: &ResourceType, row: Record, select: Option<&[String]>) -> Record {
    match select {
        None => row,
        Some(fields) => row
            .into_iter()
            .filter(|(k, _)| *k == resource.primary_key || fields.contains(k))
            .collect(),
    }
}

fn paginate(rows: Vec<Record>, skip: u64, limit: Option<u64>) -> Vec<Record> {
    let iter = rows.into_iter().skip(skip as usize);
    match limit {
        Some(n) => iter.take(n as usize).collect(),
        None => iter.collect(),
    }
}

fn sort_rows(rows: &mut [Record], sort: &[SortKey]) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in sort {
            let ord = compare_values(
                a.get(&key.field).unwrap_or(&Value::Null),
                b.get(&key.field).unwrap_or(&Value::Null),
            );
            let ord = match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Equality that treats `1` and `"1"` as the same key.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => key_string(a) == key_string(b),
    }
}

fn matches_criteria(row: &Record, criteria: &Criteria) -> bool {
    criteria.conditions.iter().all(|(field, condition)| {
        let v = row.get(field).unwrap_or(&Value::Null);
        let text = || key_string(v).to_lowercase();
        match condition {
            Condition::Eq(x) => loose_eq(v, x),
            Condition::Ne(x) => !loose_eq(v, x),
            Condition::In(xs) => xs.iter().any(|x| loose_eq(v, x)),
            Condition::NotIn(xs) => !xs.iter().any(|x| loose_eq(v, x)),
            Condition::Contains(s) => !v.is_null() && text().contains(&s.to_lowercase()),
            Condition::StartsWith(s) => !v.is_null() && text().starts_with(&s.to_lowercase()),
            Condition::EndsWith(s) => !v.is_null() && text().ends_with(&s.to_lowercase()),
            Condition::Lt(x) => !v.is_null() && compare_values(v, x) == Ordering::Less,
            Condition::Lte(x) => !v.is_null() && compare_values(v, x) != Ordering::Greater,
            Condition::Gt(x) => !v.is_null() && compare_values(v, x) == Ordering::Greater,
            Condition::Gte(x) => !v.is_null() && compare_values(v, x) != Ordering::Less,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;

    fn store() -> (Arc<SchemaRegistry>, MemoryStore) {
        let registry = Arc::new(
            resolve(&FullConfig {
                models: serde_json::from_value(json!([
                    { "identity": "foo", "attributes": {
                        "name": { "type": "string", "unique": true },
                        "bars": { "collection": "bar", "via": "foos" }
                    } },
                    { "identity": "bar", "attributes": {
                        "name": { "type": "string" },
                        "foos": { "collection": "foo", "via": "bars" }
                    } }
                ]))
                .unwrap(),
                ..FullConfig::default()
            })
            .unwrap(),
        );
        let store = MemoryStore::new(registry.clone());
        store
            .seed("foo", json!([{ "name": "a" }, { "name": "b" }]))
            .unwrap();
        store
            .seed("bar", json!([{ "name": "z" }, { "name": "y" }, { "name": "x" }]))
            .unwrap();
        store
            .seed_relation("foo", json!(1), "bars", vec![json!(1), json!(2), json!(3)])
            .unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn test_populate_many_to_many_with_sub_criteria() {
        let (registry, store) = store();
        let foo = registry.get("foo").unwrap();
        let populate = Populate {
            sort: vec![SortKey::asc("name")],
            limit: Some(2),
            ..Populate::new("bars")
        };
        let found = store.find_one(foo, &json!(1), &[populate]).await.unwrap().unwrap();
        let Populated::Many(bars) = &found.populated["bars"] else {
            panic!("expected many")
        };
        let names: Vec<_> = bars.iter().map(|b| b["name"].clone()).collect();
        assert_eq!(names, vec![json!("x"), json!("y")]);
    }

    #[tokio::test]
    async fn test_count_grouped_over_junction() {
        let (registry, store) = store();
        let foo = registry.get("foo").unwrap();
        let bars = foo.association("bars").unwrap();
        let junction = registry.get(bars.junction().unwrap()).unwrap();
        let counts = store
            .count_grouped(junction, "foo_bars", &[json!(1), json!(2)])
            .await
            .unwrap();
        assert_eq!(counts["1"], 3);
        assert_eq!(counts["2"], 0);
    }

    #[tokio::test]
    async fn test_unique_violation() {
        let (registry, store) = store();
        let foo = registry.get("foo").unwrap();
        let mut values = Record::new();
        values.insert("name".into(), json!("a"));
        let err = store.create(foo, &values).await.unwrap_err();
        assert!(matches!(err, StoreError::Unique { .. }));
    }

    #[tokio::test]
    async fn test_destroy_cleans_junction_rows() {
        let (registry, store) = store();
        let bar = registry.get("bar").unwrap();
        store.destroy(bar, &json!(2)).await.unwrap().unwrap();
        let junction = registry.junctions().next().unwrap();
        let counts = store.count_grouped(junction, "foo_bars", &[json!(1)]).await.unwrap();
        assert_eq!(counts["1"], 2);
    }

    #[test]
    fn test_criteria_modifiers() {
        let mut row = Record::new();
        row.insert("name".into(), json!("2 Foo"));
        row.insert("age".into(), json!(46));
        assert!(matches_criteria(&row, &Criteria::new().and("name", Condition::Contains("foo".into()))));
        assert!(matches_criteria(&row, &Criteria::new().and("age", Condition::Gte(json!(46)))));
        assert!(!matches_criteria(&row, &Criteria::new().and("age", Condition::Lt(json!(10)))));
        assert!(matches_criteria(
            &row,
            &Criteria::new().and("name", Condition::In(vec![json!("x"), json!("2 Foo")]))
        ));
    }
}
