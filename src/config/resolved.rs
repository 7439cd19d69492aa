//! Resolved schema: declarations validated and flattened for runtime use.

use crate::config::{AttributeType, PresentationDefaults, PresentationOverride};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// How an association is stored, decided once at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationKind {
    /// We hold the foreign key (attribute named after the alias).
    BelongsToOne,
    /// The target holds a single-valued back-reference named `via`.
    DirectMany { via: String },
    /// Rows of `junction` link us (`owner_column`) to the target (`target_column`).
    ManyToManyThroughJunction {
        junction: String,
        owner_column: String,
        target_column: String,
    },
}

#[derive(Clone, Debug)]
pub struct AssociationDescriptor {
    pub alias: String,
    /// Target resource identity.
    pub target: String,
    /// Inverse alias on the target, when declared.
    pub via: Option<String>,
    pub kind: AssociationKind,
    pub presentation: Option<PresentationOverride>,
}

impl AssociationDescriptor {
    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            AssociationKind::BelongsToOne => Cardinality::One,
            _ => Cardinality::Many,
        }
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self.kind, AssociationKind::ManyToManyThroughJunction { .. })
    }

    pub fn junction(&self) -> Option<&str> {
        match &self.kind {
            AssociationKind::ManyToManyThroughJunction { junction, .. } => Some(junction),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttributeDescriptor {
    pub name: String,
    pub type_: AttributeType,
    pub required: bool,
    pub unique: bool,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub is_in: Option<Vec<Value>>,
}

/// One side of a synthesized junction: `column` references `resource`, which knows the
/// relation as `alias` (none for a one-way collection's target side).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JunctionSide {
    pub resource: String,
    pub alias: Option<String>,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct ResourceType {
    /// Storage identity, camelCase.
    pub identity: String,
    pub primary_key: String,
    /// Wire `type` (kebab-case singular).
    pub wire_type: String,
    /// Path segment (kebab-case plural).
    pub plural: String,
    pub table_name: String,
    /// False for junction entities, which have no caller-facing identity.
    pub user_facing: bool,
    pub attributes: Vec<AttributeDescriptor>,
    pub associations: Vec<AssociationDescriptor>,
    pub presentation: Option<PresentationOverride>,
    /// Set on synthesized junctions only.
    pub junction_sides: Option<[JunctionSide; 2]>,
}

impl ResourceType {
    pub fn association(&self, alias: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.alias == alias)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn primary_key_type(&self) -> AttributeType {
        self.attribute(&self.primary_key)
            .map(|a| a.type_)
            .unwrap_or(AttributeType::Number)
    }

    /// Storage columns of this type: plain attributes plus belongs-to foreign keys.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str()).chain(
            self.associations
                .iter()
                .filter(|a| a.kind == AssociationKind::BelongsToOne)
                .map(|a| a.alias.as_str()),
        )
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns().any(|c| c == name)
    }
}

/// Every registered resource type, built once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    types: IndexMap<String, ResourceType>,
    by_plural: HashMap<String, String>,
    pub presentation: PresentationDefaults,
}

impl SchemaRegistry {
    pub fn new(types: Vec<ResourceType>, presentation: PresentationDefaults) -> Self {
        let by_plural = types
            .iter()
            .filter(|t| t.user_facing)
            .map(|t| (t.plural.clone(), t.identity.clone()))
            .collect();
        SchemaRegistry {
            types: types.into_iter().map(|t| (t.identity.clone(), t)).collect(),
            by_plural,
            presentation,
        }
    }

    pub fn get(&self, identity: &str) -> Option<&ResourceType> {
        self.types.get(identity)
    }

    /// Look up a caller-facing type by its path segment.
    pub fn by_plural(&self, plural: &str) -> Option<&ResourceType> {
        self.by_plural.get(plural).and_then(|id| self.types.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }

    pub fn junctions(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values().filter(|t| !t.user_facing)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
