//! Storage collaborator. The blueprint core only talks to a [`Store`]; it never embeds
//! storage-engine semantics itself.

mod memory;
mod postgres;
mod query;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::*;

use crate::config::ResourceType;
use crate::error::StoreError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A row as returned by the store: attribute name -> value. Belongs-to associations hold the
/// foreign key under the association alias.
pub type Record = Map<String, Value>;

/// Related rows joined for one alias.
#[derive(Clone, Debug, PartialEq)]
pub enum Populated {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Populated {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Populated::One(r) => r.iter().collect(),
            Populated::Many(rs) => rs.iter().collect(),
        }
    }
}

/// A fetched record plus whatever associations the query populated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedRecord {
    pub record: Record,
    pub populated: IndexMap<String, Populated>,
}

impl FetchedRecord {
    pub fn new(record: Record) -> Self {
        FetchedRecord {
            record,
            populated: IndexMap::new(),
        }
    }
}

/// String form of a key value, used for ids on the wire and for map keys.
pub fn key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching `query.criteria`, sorted, paginated and populated.
    async fn find(
        &self,
        resource: &ResourceType,
        query: &FindQuery,
    ) -> Result<Vec<FetchedRecord>, StoreError>;

    async fn find_one(
        &self,
        resource: &ResourceType,
        pk: &Value,
        populate: &[Populate],
    ) -> Result<Option<FetchedRecord>, StoreError> {
        let query = FindQuery {
            criteria: Criteria::new().and(resource.primary_key.clone(), Condition::Eq(pk.clone())),
            limit: Some(1),
            populate: populate.to_vec(),
            ..FindQuery::default()
        };
        Ok(self.find(resource, &query).await?.into_iter().next())
    }

    async fn count(&self, resource: &ResourceType, criteria: &Criteria) -> Result<u64, StoreError>;

    /// Row counts grouped by `column`, restricted to `keys`. Keys without rows map to 0.
    async fn count_grouped(
        &self,
        resource: &ResourceType,
        column: &str,
        keys: &[Value],
    ) -> Result<HashMap<String, u64>, StoreError>;

    async fn create(&self, resource: &ResourceType, values: &Record) -> Result<Record, StoreError>;

    async fn update(
        &self,
        resource: &ResourceType,
        pk: &Value,
        values: &Record,
    ) -> Result<Option<Record>, StoreError>;

    async fn destroy(&self, resource: &ResourceType, pk: &Value) -> Result<Option<Record>, StoreError>;

    /// Make `ids` the full set of related keys of a to-many association.
    async fn replace_collection(
        &self,
        resource: &ResourceType,
        pk: &Value,
        alias: &str,
        ids: &[Value],
    ) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
