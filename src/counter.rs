//! Relationship cardinality counting.
//!
//! Counts are advisory. A failed batch never fails the request: every key of the batch is
//! marked [`CountOutcome::Failed`] and the document carries the error next to a null count.

use crate::config::{ResourceType, SchemaRegistry};
use crate::error::StoreError;
use crate::junction::{CountStrategy, JunctionMap};
use crate::store::{key_string, Condition, Criteria, FindQuery, Populate, Populated, Store};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Semaphore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountOutcome {
    Counted(u64),
    Failed(String),
}

/// (type identity, alias, primary-key string) -> outcome. Built fresh per request.
#[derive(Clone, Debug, Default)]
pub struct RelationshipCounts {
    outcomes: HashMap<(String, String, String), CountOutcome>,
}

impl RelationshipCounts {
    pub fn get(&self, identity: &str, alias: &str, pk: &str) -> Option<&CountOutcome> {
        self.outcomes
            .get(&(identity.to_string(), alias.to_string(), pk.to_string()))
    }

    pub fn insert(&mut self, identity: &str, alias: &str, pk: String, outcome: CountOutcome) {
        self.outcomes
            .insert((identity.to_string(), alias.to_string(), pk), outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// One batched count: every key of the type `identity` for one alias.
#[derive(Clone, Debug)]
pub struct CountBatch {
    pub identity: String,
    pub alias: String,
    pub keys: Vec<Value>,
}

pub struct RelationshipCounter<'a> {
    store: &'a dyn Store,
    registry: &'a SchemaRegistry,
    junctions: &'a JunctionMap,
}

impl<'a> RelationshipCounter<'a> {
    pub fn new(store: &'a dyn Store, registry: &'a SchemaRegistry, junctions: &'a JunctionMap) -> Self {
        RelationshipCounter {
            store,
            registry,
            junctions,
        }
    }

    pub async fn count(&self, resource: &ResourceType, alias: &str, pk: &Value) -> CountOutcome {
        self.count_many(resource, alias, std::slice::from_ref(pk))
            .await
            .remove(&key_string(pk))
            .unwrap_or(CountOutcome::Counted(0))
    }

    /// Counts for every key, keyed by the key's string form.
    pub async fn count_many(
        &self,
        resource: &ResourceType,
        alias: &str,
        keys: &[Value],
    ) -> HashMap<String, CountOutcome> {
        match self.try_count_many(resource, alias, keys).await {
            Ok(counts) => keys
                .iter()
                .map(|k| {
                    let k = key_string(k);
                    let n = counts.get(&k).copied().unwrap_or(0);
                    (k, CountOutcome::Counted(n))
                })
                .collect(),
            Err(e) => {
                tracing::warn!(
                    resource = %resource.identity,
                    alias = %alias,
                    keys = keys.len(),
                    error = %e,
                    "relationship count failed"
                );
                let detail = e.to_string();
                keys.iter()
                    .map(|k| (key_string(k), CountOutcome::Failed(detail.clone())))
                    .collect()
            }
        }
    }

    async fn try_count_many(
        &self,
        resource: &ResourceType,
        alias: &str,
        keys: &[Value],
    ) -> Result<HashMap<String, u64>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        match self.junctions.strategy(&resource.identity, alias) {
            CountStrategy::DirectMany { target, via } => {
                let target = self.lookup(target)?;
                self.store.count_grouped(target, via, keys).await
            }
            CountStrategy::Junction { junction, column } => {
                let junction = self.lookup(junction)?;
                self.store.count_grouped(junction, column, keys).await
            }
            CountStrategy::BelongsToOne => {
                let query = FindQuery {
                    criteria: Criteria::new()
                        .and(resource.primary_key.clone(), Condition::In(keys.to_vec())),
                    select: Some(Vec::new()),
                    populate: vec![Populate {
                        select: Some(Vec::new()),
                        ..Populate::new(alias)
                    }],
                    ..FindQuery::default()
                };
                let rows = self.store.find(resource, &query).await?;
                Ok(rows
                    .iter()
                    .filter_map(|r| {
                        let pk = r.record.get(&resource.primary_key)?;
                        let n = match r.populated.get(alias) {
                            Some(Populated::One(Some(_))) => 1,
                            _ => 0,
                        };
                        Some((key_string(pk), n))
                    })
                    .collect())
            }
            CountStrategy::Zero => Ok(HashMap::new()),
        }
    }

    fn lookup(&self, identity: &str) -> Result<&'a ResourceType, StoreError> {
        self.registry
            .get(identity)
            .ok_or_else(|| StoreError::UnknownType(identity.to_string()))
    }

    /// Run every batch with at most `concurrency` in flight.
    pub async fn count_all(&self, batches: Vec<CountBatch>, concurrency: usize) -> RelationshipCounts {
        let semaphore = Semaphore::new(concurrency.max(1));
        let mut pending = FuturesUnordered::new();
        for batch in batches {
            let semaphore = &semaphore;
            pending.push(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire().await.ok();
                let outcomes = match self.lookup(&batch.identity) {
                    Ok(resource) => self.count_many(resource, &batch.alias, &batch.keys).await,
                    Err(e) => batch
                        .keys
                        .iter()
                        .map(|k| (key_string(k), CountOutcome::Failed(e.to_string())))
                        .collect(),
                };
                (batch, outcomes)
            });
        }

        let mut counts = RelationshipCounts::default();
        while let Some((batch, outcomes)) = pending.next().await {
            for (pk, outcome) in outcomes {
                counts.insert(&batch.identity, &batch.alias, pk, outcome);
            }
        }
        tracing::debug!(outcomes = counts.len(), "relationship counts");
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::{MemoryStore, Record};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            resolve(&FullConfig {
                models: serde_json::from_value(json!([
                    { "identity": "foo", "attributes": {
                        "bars": { "collection": "bar", "via": "foos" },
                        "myBar": { "model": "bar" }
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
        )
    }

    #[tokio::test]
    async fn test_many_to_many_counts_junction_rows() {
        let registry = registry();
        let store = MemoryStore::new(registry.clone());
        store.seed("bar", json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }])).unwrap();
        store.seed("foo", json!([{ "myBar": 1 }, { "myBar": null }])).unwrap();
        store
            .seed_relation("foo", json!(1), "bars", vec![json!(1), json!(2), json!(3)])
            .unwrap();
        let junctions = JunctionMap::build(&registry);
        let counter = RelationshipCounter::new(&store, &registry, &junctions);
        let foo = registry.get("foo").unwrap();

        let counts = counter.count_many(foo, "bars", &[json!(1), json!(2)]).await;
        assert_eq!(counts["1"], CountOutcome::Counted(3));
        assert_eq!(counts["2"], CountOutcome::Counted(0));

        let counts = counter.count_many(foo, "myBar", &[json!(1), json!(2)]).await;
        assert_eq!(counts["1"], CountOutcome::Counted(1));
        assert_eq!(counts["2"], CountOutcome::Counted(0));

        let bar = registry.get("bar").unwrap();
        assert_eq!(counter.count(bar, "foos", &json!(2)).await, CountOutcome::Counted(1));
    }

    #[tokio::test]
    async fn test_count_all_with_single_permit() {
        let registry = registry();
        let store = MemoryStore::new(registry.clone());
        store.seed("bar", json!([{ "name": "a" }, { "name": "b" }])).unwrap();
        store.seed("foo", json!([{ "myBar": 2 }, {}])).unwrap();
        store
            .seed_relation("foo", json!(2), "bars", vec![json!(1), json!(2)])
            .unwrap();
        let junctions = JunctionMap::build(&registry);
        let counter = RelationshipCounter::new(&store, &registry, &junctions);
        let batches = vec![
            CountBatch { identity: "foo".into(), alias: "bars".into(), keys: vec![json!(1), json!(2)] },
            CountBatch { identity: "foo".into(), alias: "myBar".into(), keys: vec![json!(1), json!(2)] },
            CountBatch { identity: "bar".into(), alias: "foos".into(), keys: vec![json!(1)] },
        ];
        let counts = counter.count_all(batches, 1).await;
        assert_eq!(counts.len(), 5);
        assert_eq!(counts.get("foo", "bars", "2"), Some(&CountOutcome::Counted(2)));
        assert_eq!(counts.get("foo", "myBar", "1"), Some(&CountOutcome::Counted(1)));
        assert_eq!(counts.get("foo", "myBar", "2"), Some(&CountOutcome::Counted(0)));
        assert_eq!(counts.get("bar", "foos", "1"), Some(&CountOutcome::Counted(1)));
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn find(&self, _: &ResourceType, _: &FindQuery) -> Result<Vec<crate::store::FetchedRecord>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn count(&self, _: &ResourceType, _: &Criteria) -> Result<u64, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn count_grouped(&self, _: &ResourceType, _: &str, _: &[Value]) -> Result<HashMap<String, u64>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn create(&self, _: &ResourceType, _: &Record) -> Result<Record, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn update(&self, _: &ResourceType, _: &Value, _: &Record) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn destroy(&self, _: &ResourceType, _: &Value) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn replace_collection(&self, _: &ResourceType, _: &Value, _: &str, _: &[Value]) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_every_key() {
        let registry = registry();
        let junctions = JunctionMap::build(&registry);
        let counter = RelationshipCounter::new(&BrokenStore, &registry, &junctions);
        let batches = vec![
            CountBatch { identity: "foo".into(), alias: "bars".into(), keys: vec![json!(1), json!(2)] },
            CountBatch { identity: "foo".into(), alias: "myBar".into(), keys: vec![json!(1)] },
        ];
        let counts = counter.count_all(batches, 2).await;
        assert_eq!(counts.len(), 3);
        assert!(matches!(counts.get("foo", "bars", "2"), Some(CountOutcome::Failed(_))));
        assert!(matches!(counts.get("foo", "myBar", "1"), Some(CountOutcome::Failed(_))));
    }
}
