//! Query vocabulary handed to a store: criteria, sort, pagination and populate requests.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
}

/// Conjunction of per-attribute conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    pub conditions: Vec<(String, Condition)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    pub fn push(&mut self, field: impl Into<String>, condition: Condition) {
        self.conditions.push((field.into(), condition));
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Join request for one association alias, with optional sub-criteria for the related rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Populate {
    pub alias: String,
    /// Attributes of the related type to return (primary key always added).
    pub select: Option<Vec<String>>,
    pub criteria: Criteria,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl Populate {
    pub fn new(alias: impl Into<String>) -> Self {
        Populate {
            alias: alias.into(),
            ..Populate::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindQuery {
    pub criteria: Criteria,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub select: Option<Vec<String>>,
    pub populate: Vec<Populate>,
}

impl FindQuery {
    pub fn new(criteria: Criteria) -> Self {
        FindQuery {
            criteria,
            ..FindQuery::default()
        }
    }
}
