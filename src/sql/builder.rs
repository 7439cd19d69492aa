//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from resolved resource types.

use crate::config::{AssociationKind, ResourceType, SchemaRegistry};
use crate::error::StoreError;
use crate::store::{Condition, Criteria, FindQuery, Populate, SortKey};
use serde_json::Value;

/// Column name prefix under which populated associations come back from [`select`].
pub const POPULATE_PREFIX: &str = "_populate_";

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    /// Placeholder for `v`; JSON null is inlined as `NULL` and never bound.
    fn push_value(&mut self, v: &Value) -> String {
        if v.is_null() {
            return "NULL".to_string();
        }
        self.params.push(v.clone());
        format!("${}", self.params.len())
    }
}

fn column_ref(qualifier: Option<&str>, column: &str) -> String {
    match qualifier {
        Some(q) => format!("{}.{}", q, quoted(column)),
        None => quoted(column),
    }
}

/// SELECT list: primary key plus the selected columns (all columns when `select` is None).
fn select_column_list(resource: &ResourceType, select: Option<&[String]>, qualifier: Option<&str>) -> String {
    resource
        .columns()
        .filter(|c| {
            *c == resource.primary_key
                || select.map(|s| s.iter().any(|f| f == c)).unwrap_or(true)
        })
        .map(|c| match qualifier {
            Some(_) => format!("{} AS {}", column_ref(qualifier, c), quoted(c)),
            None => quoted(c),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn like_pattern(prefix: &str, s: &str, suffix: &str) -> Value {
    let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    Value::String(format!("{}{}{}", prefix, escaped, suffix))
}

fn placeholders(q: &mut QueryBuf, values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| q.push_value(v))
        .collect()
}

fn condition_sql(q: &mut QueryBuf, col: &str, condition: &Condition) -> String {
    match condition {
        Condition::Eq(v) if v.is_null() => format!("{} IS NULL", col),
        Condition::Eq(v) => format!("{} = {}", col, q.push_value(v)),
        Condition::Ne(v) if v.is_null() => format!("{} IS NOT NULL", col),
        Condition::Ne(v) => format!("{} IS DISTINCT FROM {}", col, q.push_value(v)),
        Condition::In(vs) => {
            let ph = placeholders(q, vs);
            if ph.is_empty() {
                "FALSE".to_string()
            } else {
                format!("{} IN ({})", col, ph.join(", "))
            }
        }
        Condition::NotIn(vs) => {
            let ph = placeholders(q, vs);
            if ph.is_empty() {
                "TRUE".to_string()
            } else {
                format!("{} NOT IN ({})", col, ph.join(", "))
            }
        }
        Condition::Contains(s) => format!("{}::text ILIKE {}", col, q.push_value(&like_pattern("%", s, "%"))),
        Condition::StartsWith(s) => format!("{}::text ILIKE {}", col, q.push_value(&like_pattern("", s, "%"))),
        Condition::EndsWith(s) => format!("{}::text ILIKE {}", col, q.push_value(&like_pattern("%", s, ""))),
        Condition::Lt(v) => format!("{} < {}", col, q.push_value(v)),
        Condition::Lte(v) => format!("{} <= {}", col, q.push_value(v)),
        Condition::Gt(v) => format!("{} > {}", col, q.push_value(v)),
        Condition::Gte(v) => format!("{} >= {}", col, q.push_value(v)),
    }
}

/// Conditions on unknown columns are rejected so callers never silently widen a result set.
fn where_parts(
    q: &mut QueryBuf,
    resource: &ResourceType,
    criteria: &Criteria,
    qualifier: Option<&str>,
) -> Result<Vec<String>, StoreError> {
    criteria
        .conditions
        .iter()
        .map(|(field, condition)| {
            if !resource.has_column(field) {
                return Err(StoreError::InvalidValue(format!(
                    "unknown attribute '{}' for {}",
                    field, resource.identity
                )));
            }
            Ok(condition_sql(q, &column_ref(qualifier, field), condition))
        })
        .collect()
}

fn order_clause(resource: &ResourceType, sort: &[SortKey], qualifier: Option<&str>) -> String {
    let keys: Vec<String> = sort
        .iter()
        .filter(|k| resource.has_column(&k.field))
        .map(|k| format!("{} {}", column_ref(qualifier, &k.field), k.direction.as_sql()))
        .collect();
    if keys.is_empty() {
        format!(" ORDER BY {}", column_ref(qualifier, &resource.primary_key))
    } else {
        format!(" ORDER BY {}", keys.join(", "))
    }
}

fn page_clause(skip: u64, limit: Option<u64>) -> String {
    let limit = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset = if skip > 0 { format!(" OFFSET {}", skip) } else { String::new() };
    format!("{}{}", limit, offset)
}

fn and_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn lookup<'a>(registry: &'a SchemaRegistry, identity: &str) -> Result<&'a ResourceType, StoreError> {
    registry
        .get(identity)
        .ok_or_else(|| StoreError::UnknownType(identity.to_string()))
}

/// Scalar subquery for one populated association: row_to_json for to-one, json_agg for to-many.
fn populate_subquery(
    q: &mut QueryBuf,
    registry: &SchemaRegistry,
    resource: &ResourceType,
    spec: &Populate,
    schema: &str,
) -> Result<String, StoreError> {
    let assoc = resource
        .association(&spec.alias)
        .ok_or_else(|| StoreError::UnknownAssociation {
            resource: resource.identity.clone(),
            alias: spec.alias.clone(),
        })?;
    let target = lookup(registry, &assoc.target)?;
    let rel_table = qualified_table(schema, &target.table_name);
    let rel_cols = select_column_list(target, spec.select.as_deref(), None);
    let main_pk = column_ref(Some(MAIN_ALIAS), &resource.primary_key);

    let name = quoted(&format!("{}{}", POPULATE_PREFIX, spec.alias));

    let link = match &assoc.kind {
        AssociationKind::BelongsToOne => {
            return Ok(format!(
                "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} WHERE {} = {}) sub) AS {}",
                rel_cols,
                rel_table,
                quoted(&target.primary_key),
                column_ref(Some(MAIN_ALIAS), &assoc.alias),
                name
            ));
        }
        AssociationKind::DirectMany { via } => format!("{} = {}", quoted(via), main_pk),
        AssociationKind::ManyToManyThroughJunction {
            junction,
            owner_column,
            target_column,
        } => {
            let junction = lookup(registry, junction)?;
            format!(
                "{} IN (SELECT {} FROM {} WHERE {} = {})",
                quoted(&target.primary_key),
                quoted(target_column),
                qualified_table(schema, &junction.table_name),
                quoted(owner_column),
                main_pk
            )
        }
    };
    let mut parts = vec![link];
    parts.extend(where_parts(q, target, &spec.criteria, None)?);
    Ok(format!(
        "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {}{}{}{}) sub) AS {}",
        rel_cols,
        rel_table,
        and_clause(&parts),
        order_clause(target, &spec.sort, None),
        page_clause(spec.skip, spec.limit),
        name
    ))
}

/// SELECT with criteria, sort, pagination and populated associations in a single query. The
/// main table is aliased as "main"; each populate is a scalar subquery named
/// `{POPULATE_PREFIX}{alias}`.
pub fn select(
    registry: &SchemaRegistry,
    resource: &ResourceType,
    query: &FindQuery,
    schema: &str,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &resource.table_name);
    let mut select_parts = vec![select_column_list(resource, query.select.as_deref(), Some(MAIN_ALIAS))];
    for spec in &query.populate {
        select_parts.push(populate_subquery(&mut q, registry, resource, spec, schema)?);
    }
    let parts = where_parts(&mut q, resource, &query.criteria, Some(MAIN_ALIAS))?;
    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}",
        select_parts.join(", "),
        table,
        MAIN_ALIAS,
        and_clause(&parts),
        order_clause(resource, &query.sort, Some(MAIN_ALIAS)),
        page_clause(query.skip, query.limit)
    );
    Ok(q)
}

pub fn count(resource: &ResourceType, criteria: &Criteria, schema: &str) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let parts = where_parts(&mut q, resource, criteria, None)?;
    q.sql = format!(
        "SELECT COUNT(*) AS count FROM {}{}",
        qualified_table(schema, &resource.table_name),
        and_clause(&parts)
    );
    Ok(q)
}

/// Row counts per value of `column`, limited to `keys`. The key comes back as text.
pub fn count_grouped(resource: &ResourceType, column: &str, keys: &[Value], schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let col = quoted(column);
    let ph = placeholders(&mut q, keys);
    let filter = if ph.is_empty() {
        "FALSE".to_string()
    } else {
        format!("{} IN ({})", col, ph.join(", "))
    };
    q.sql = format!(
        "SELECT {}::text AS key, COUNT(*) AS count FROM {} WHERE {} GROUP BY {}",
        col,
        qualified_table(schema, &resource.table_name),
        filter,
        col
    );
    q
}

/// INSERT of the given columns, returning every column.
pub fn insert(resource: &ResourceType, values: &serde_json::Map<String, Value>, schema: &str) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &resource.table_name);
    let mut cols = Vec::new();
    let mut phs = Vec::new();
    for (name, v) in values {
        if !resource.has_column(name) {
            return Err(StoreError::InvalidValue(format!(
                "unknown attribute '{}' for {}",
                name, resource.identity
            )));
        }
        cols.push(quoted(name));
        phs.push(q.push_value(v));
    }
    let returning = select_column_list(resource, None, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            phs.join(", "),
            returning
        )
    };
    Ok(q)
}

/// UPDATE by primary key: SET only the given columns. With nothing to set this degrades to a
/// SELECT of the row.
pub fn update(
    resource: &ResourceType,
    pk: &Value,
    values: &serde_json::Map<String, Value>,
    schema: &str,
) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &resource.table_name);
    let mut sets = Vec::new();
    for (name, v) in values {
        if *name == resource.primary_key {
            continue;
        }
        if !resource.has_column(name) {
            return Err(StoreError::InvalidValue(format!(
                "unknown attribute '{}' for {}",
                name, resource.identity
            )));
        }
        let rhs = q.push_value(v);
        sets.push(format!("{} = {}", quoted(name), rhs));
    }
    let returning = select_column_list(resource, None, None);
    let id = q.push_value(pk);
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {}", returning, table, quoted(&resource.primary_key), id)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            quoted(&resource.primary_key),
            id,
            returning
        )
    };
    Ok(q)
}

/// DELETE by primary key.
pub fn delete(resource: &ResourceType, pk: &Value, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id = q.push_value(pk);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(schema, &resource.table_name),
        quoted(&resource.primary_key),
        id,
        select_column_list(resource, None, None)
    );
    q
}

/// DELETE every row of `resource` whose `column` equals `key`. Used for junction cleanup.
pub fn delete_where(resource: &ResourceType, column: &str, key: &Value, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let k = q.push_value(key);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(schema, &resource.table_name),
        quoted(column),
        k
    );
    q
}

/// Statements (run in order, in one transaction) that make `ids` the full related set of
/// `alias` for the record `pk`.
pub fn replace_collection(
    registry: &SchemaRegistry,
    resource: &ResourceType,
    pk: &Value,
    alias: &str,
    ids: &[Value],
    schema: &str,
) -> Result<Vec<QueryBuf>, StoreError> {
    let assoc = resource
        .association(alias)
        .ok_or_else(|| StoreError::UnknownAssociation {
            resource: resource.identity.clone(),
            alias: alias.to_string(),
        })?;
    let target = lookup(registry, &assoc.target)?;
    match &assoc.kind {
        AssociationKind::BelongsToOne => Err(StoreError::InvalidValue(format!(
            "{} is not a to-many association",
            alias
        ))),
        AssociationKind::DirectMany { via } => {
            let table = qualified_table(schema, &target.table_name);
            let mut detach = QueryBuf::new();
            let owner = detach.push_value(pk);
            let keep = placeholders(&mut detach, ids);
            detach.sql = format!(
                "UPDATE {} SET {} = NULL WHERE {} = {}{}",
                table,
                quoted(via),
                quoted(via),
                owner,
                if keep.is_empty() {
                    String::new()
                } else {
                    format!(" AND {} NOT IN ({})", quoted(&target.primary_key), keep.join(", "))
                }
            );
            let mut statements = vec![detach];
            if !ids.is_empty() {
                let mut attach = QueryBuf::new();
                let owner = attach.push_value(pk);
                let wanted = placeholders(&mut attach, ids);
                attach.sql = format!(
                    "UPDATE {} SET {} = {} WHERE {} IN ({})",
                    table,
                    quoted(via),
                    owner,
                    quoted(&target.primary_key),
                    wanted.join(", ")
                );
                statements.push(attach);
            }
            Ok(statements)
        }
        AssociationKind::ManyToManyThroughJunction {
            junction,
            owner_column,
            target_column,
        } => {
            let junction = lookup(registry, junction)?;
            let mut statements = vec![delete_where(junction, owner_column, pk, schema)];
            if !ids.is_empty() {
                let mut insert = QueryBuf::new();
                let owner = insert.push_value(pk);
                let rows: Vec<String> = ids
                    .iter()
                    .map(|id| format!("({}, {})", owner, insert.push_value(id)))
                    .collect();
                insert.sql = format!(
                    "INSERT INTO {} ({}, {}) VALUES {}",
                    qualified_table(schema, &junction.table_name),
                    quoted(owner_column),
                    quoted(target_column),
                    rows.join(", ")
                );
                statements.push(insert);
            }
            Ok(statements)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::Condition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        resolve(&FullConfig {
            models: serde_json::from_value(json!([
                { "identity": "article", "attributes": {
                    "title": { "type": "string" },
                    "author": { "model": "author" },
                    "comments": { "collection": "comment", "via": "article" }
                } },
                { "identity": "author", "attributes": {
                    "name": { "type": "string" },
                    "articles": { "collection": "article", "via": "author" }
                } },
                { "identity": "comment", "attributes": {
                    "text": { "type": "string" },
                    "article": { "model": "article" }
                } },
                { "identity": "foo", "attributes": { "bars": { "collection": "bar", "via": "foos" } } },
                { "identity": "bar", "attributes": { "foos": { "collection": "foo", "via": "bars" } } }
            ]))
            .unwrap(),
            ..FullConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_select_with_criteria_sort_and_page() {
        let r = registry();
        let article = r.get("article").unwrap();
        let query = FindQuery {
            criteria: Criteria::new()
                .and("title", Condition::Contains("rust".into()))
                .and("author", Condition::Eq(json!(2))),
            sort: vec![SortKey::desc("title")],
            skip: 10,
            limit: Some(5),
            ..FindQuery::default()
        };
        let q = select(&r, article, &query, "public").unwrap();
        assert_eq!(
            q.sql,
            "SELECT main.\"id\" AS \"id\", main.\"title\" AS \"title\", main.\"author\" AS \"author\" \
             FROM \"public\".\"article\" main WHERE main.\"title\"::text ILIKE $1 AND main.\"author\" = $2 \
             ORDER BY main.\"title\" DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(q.params, vec![json!("%rust%"), json!(2)]);
    }

    #[test]
    fn test_select_populates_direct_many_and_belongs_to() {
        let r = registry();
        let article = r.get("article").unwrap();
        let query = FindQuery {
            populate: vec![
                Populate::new("author"),
                Populate {
                    limit: Some(3),
                    ..Populate::new("comments")
                },
            ],
            ..FindQuery::default()
        };
        let q = select(&r, article, &query, "public").unwrap();
        assert!(q.sql.contains(
            "(SELECT row_to_json(sub) FROM (SELECT \"id\", \"name\" FROM \"public\".\"author\" \
             WHERE \"id\" = main.\"author\") sub) AS \"_populate_author\""
        ));
        assert!(q.sql.contains(
            "FROM \"public\".\"comment\" WHERE \"article\" = main.\"id\" ORDER BY \"id\" LIMIT 3) sub) \
             AS \"_populate_comments\""
        ));
    }

    #[test]
    fn test_select_populates_many_to_many_through_junction() {
        let r = registry();
        let foo = r.get("foo").unwrap();
        let query = FindQuery {
            populate: vec![Populate::new("bars")],
            ..FindQuery::default()
        };
        let q = select(&r, foo, &query, "public").unwrap();
        assert!(q.sql.contains(
            "WHERE \"id\" IN (SELECT \"bar_foos\" FROM \"public\".\"bar_foos__foo_bars\" \
             WHERE \"foo_bars\" = main.\"id\")"
        ));
    }

    #[test]
    fn test_unknown_criteria_column_is_rejected() {
        let r = registry();
        let article = r.get("article").unwrap();
        let criteria = Criteria::new().and("nope", Condition::Eq(json!(1)));
        assert!(matches!(
            count(article, &criteria, "public"),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_null_is_inlined() {
        let r = registry();
        let article = r.get("article").unwrap();
        let criteria = Criteria::new().and("author", Condition::Eq(Value::Null));
        let q = count(article, &criteria, "public").unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS count FROM \"public\".\"article\" WHERE \"author\" IS NULL"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_count_grouped() {
        let r = registry();
        let comment = r.get("comment").unwrap();
        let q = count_grouped(comment, "article", &[json!(1), json!(2)], "public");
        assert_eq!(
            q.sql,
            "SELECT \"article\"::text AS key, COUNT(*) AS count FROM \"public\".\"comment\" \
             WHERE \"article\" IN ($1, $2) GROUP BY \"article\""
        );
    }

    #[test]
    fn test_replace_many_to_many() {
        let r = registry();
        let foo = r.get("foo").unwrap();
        let qs = replace_collection(&r, foo, &json!(1), "bars", &[json!(2), json!(3)], "public").unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(
            qs[0].sql,
            "DELETE FROM \"public\".\"bar_foos__foo_bars\" WHERE \"foo_bars\" = $1"
        );
        assert_eq!(
            qs[1].sql,
            "INSERT INTO \"public\".\"bar_foos__foo_bars\" (\"foo_bars\", \"bar_foos\") VALUES ($1, $2), ($1, $3)"
        );
    }

    #[test]
    fn test_update_skips_primary_key() {
        let r = registry();
        let article = r.get("article").unwrap();
        let mut values = serde_json::Map::new();
        values.insert("id".into(), json!(9));
        values.insert("title".into(), json!("x"));
        let q = update(article, &json!(1), &values, "public").unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"article\" SET \"title\" = $1 WHERE \"id\" = $2 \
             RETURNING \"id\", \"title\", \"author\""
        );
    }
}
