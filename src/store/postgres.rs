//! PostgreSQL-backed [`Store`]. All SQL comes from [`crate::sql`]; this module binds, runs and
//! decodes it.

use super::{FetchedRecord, FindQuery, Populated, Record, Store};
use crate::config::{ResourceType, SchemaRegistry};
use crate::error::StoreError;
use crate::sql::{self, PgBindValue, QueryBuf, POPULATE_PREFIX};
use crate::store::Criteria;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;

pub struct PgStore {
    pool: PgPool,
    registry: Arc<SchemaRegistry>,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, registry: Arc<SchemaRegistry>, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            registry,
            schema: schema.into(),
        }
    }

    fn bind(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        query
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<PgRow>, StoreError> {
        Ok(Self::bind(q).fetch_all(&self.pool).await?)
    }

    async fn query_record(&self, q: &QueryBuf) -> Result<Option<Record>, StoreError> {
        let row = Self::bind(q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_record(&r)))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find(
        &self,
        resource: &ResourceType,
        query: &FindQuery,
    ) -> Result<Vec<FetchedRecord>, StoreError> {
        let q = sql::select(&self.registry, resource, query, &self.schema)?;
        let rows = self.query_many(&q).await?;
        Ok(rows
            .iter()
            .map(|row| split_populated(resource, row_to_record(row)))
            .collect())
    }

    async fn count(&self, resource: &ResourceType, criteria: &Criteria) -> Result<u64, StoreError> {
        let q = sql::count(resource, criteria, &self.schema)?;
        let row = Self::bind(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("count")?;
        Ok(n.max(0) as u64)
    }

    async fn count_grouped(
        &self,
        resource: &ResourceType,
        column: &str,
        keys: &[Value],
    ) -> Result<HashMap<String, u64>, StoreError> {
        let mut counts: HashMap<String, u64> =
            keys.iter().map(|k| (super::key_string(k), 0)).collect();
        if keys.is_empty() {
            return Ok(counts);
        }
        let q = sql::count_grouped(resource, column, keys, &self.schema);
        for row in self.query_many(&q).await? {
            let key: String = row.try_get("key")?;
            let n: i64 = row.try_get("count")?;
            counts.insert(key, n.max(0) as u64);
        }
        Ok(counts)
    }

    async fn create(&self, resource: &ResourceType, values: &Record) -> Result<Record, StoreError> {
        let q = sql::insert(resource, values, &self.schema)?;
        self.query_record(&q)
            .await?
            .ok_or(StoreError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(
        &self,
        resource: &ResourceType,
        pk: &Value,
        values: &Record,
    ) -> Result<Option<Record>, StoreError> {
        let q = sql::update(resource, pk, values, &self.schema)?;
        self.query_record(&q).await
    }

    async fn destroy(&self, resource: &ResourceType, pk: &Value) -> Result<Option<Record>, StoreError> {
        let mut tx = self.pool.begin().await?;
        for junction in self.registry.junctions() {
            let Some(sides) = &junction.junction_sides else { continue };
            for side in sides.iter().filter(|s| s.resource == resource.identity) {
                let q = sql::delete_where(junction, &side.column, pk, &self.schema);
                Self::bind(&q).execute(&mut *tx).await?;
            }
        }
        let q = sql::delete(resource, pk, &self.schema);
        let row = Self::bind(&q).fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    async fn replace_collection(
        &self,
        resource: &ResourceType,
        pk: &Value,
        alias: &str,
        ids: &[Value],
    ) -> Result<(), StoreError> {
        let statements = sql::replace_collection(&self.registry, resource, pk, alias, ids, &self.schema)?;
        let mut tx = self.pool.begin().await?;
        for q in &statements {
            Self::bind(q).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Move `_populate_*` columns out of the row into [`FetchedRecord::populated`].
fn split_populated(resource: &ResourceType, row: Record) -> FetchedRecord {
    let mut fetched = FetchedRecord::default();
    for (name, value) in row {
        let Some(alias) = name.strip_prefix(POPULATE_PREFIX) else {
            fetched.record.insert(name, value);
            continue;
        };
        let to_many = resource
            .association(alias)
            .map(|a| a.cardinality() == crate::config::Cardinality::Many)
            .unwrap_or(false);
        let populated = match value {
            Value::Array(items) => Populated::Many(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(m) => Some(m),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::Object(m) => Populated::One(Some(m)),
            _ if to_many => Populated::Many(Vec::new()),
            _ => Populated::One(None),
        };
        fetched.populated.insert(alias.to_string(), populated);
    }
    fetched
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
