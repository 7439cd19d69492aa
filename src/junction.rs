//! Count strategy for every (resource type, relation alias), computed once at startup.

use crate::config::{AssociationKind, SchemaRegistry};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountStrategy {
    /// Count `target` rows whose `via` column equals the key.
    DirectMany { target: String, via: String },
    /// 1 when the owner's foreign key resolves to a record, else 0.
    BelongsToOne,
    /// Count rows of `junction` whose `column` equals the key.
    Junction { junction: String, column: String },
    /// No way to count; reported as 0.
    Zero,
}

#[derive(Clone, Debug, Default)]
pub struct JunctionMap {
    strategies: HashMap<(String, String), CountStrategy>,
}

impl JunctionMap {
    pub fn build(registry: &SchemaRegistry) -> Self {
        let mut strategies = HashMap::new();

        for resource in registry.iter().filter(|t| t.user_facing) {
            for assoc in &resource.associations {
                let strategy = match &assoc.kind {
                    AssociationKind::BelongsToOne => CountStrategy::BelongsToOne,
                    AssociationKind::DirectMany { via } => CountStrategy::DirectMany {
                        target: assoc.target.clone(),
                        via: via.clone(),
                    },
                    // Explicit through models are user-facing and never appear below.
                    AssociationKind::ManyToManyThroughJunction {
                        junction,
                        owner_column,
                        ..
                    } => match registry.get(junction) {
                        Some(j) if j.user_facing => CountStrategy::Junction {
                            junction: junction.clone(),
                            column: owner_column.clone(),
                        },
                        _ => CountStrategy::Zero,
                    },
                };
                strategies.insert((resource.identity.clone(), assoc.alias.clone()), strategy);
            }
        }

        for junction in registry.junctions() {
            let Some(sides) = &junction.junction_sides else { continue };
            for assoc in &junction.associations {
                let Some(side) = sides.iter().find(|s| s.column == assoc.alias) else { continue };
                let Some(alias) = &side.alias else { continue };
                strategies.insert(
                    (side.resource.clone(), alias.clone()),
                    CountStrategy::Junction {
                        junction: junction.identity.clone(),
                        column: side.column.clone(),
                    },
                );
            }
        }

        tracing::info!(strategies = strategies.len(), "junction map built");
        JunctionMap { strategies }
    }

    pub fn strategy(&self, identity: &str, alias: &str) -> &CountStrategy {
        self.strategies
            .get(&(identity.to_string(), alias.to_string()))
            .unwrap_or(&CountStrategy::Zero)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_strategies() {
        let registry = resolve(&FullConfig {
            models: serde_json::from_value(json!([
                { "identity": "foo", "attributes": {
                    "bars": { "collection": "bar", "via": "foos" },
                    "myBar": { "model": "bar" }
                } },
                { "identity": "bar", "attributes": {
                    "foos": { "collection": "foo", "via": "bars" }
                } },
                { "identity": "author", "attributes": {
                    "articles": { "collection": "article", "via": "author" },
                    "publishers": { "collection": "publisher", "via": "author", "through": "contract" }
                } },
                { "identity": "article", "attributes": { "author": { "model": "author" } } },
                { "identity": "publisher" },
                { "identity": "contract", "attributes": {
                    "author": { "model": "author" },
                    "publisher": { "model": "publisher" }
                } }
            ]))
            .unwrap(),
            ..FullConfig::default()
        })
        .unwrap();
        let map = JunctionMap::build(&registry);

        assert_eq!(
            map.strategy("foo", "bars"),
            &CountStrategy::Junction {
                junction: "bar_foos__foo_bars".into(),
                column: "foo_bars".into()
            }
        );
        assert_eq!(
            map.strategy("bar", "foos"),
            &CountStrategy::Junction {
                junction: "bar_foos__foo_bars".into(),
                column: "bar_foos".into()
            }
        );
        assert_eq!(map.strategy("foo", "myBar"), &CountStrategy::BelongsToOne);
        assert_eq!(
            map.strategy("author", "articles"),
            &CountStrategy::DirectMany {
                target: "article".into(),
                via: "author".into()
            }
        );
        assert_eq!(
            map.strategy("author", "publishers"),
            &CountStrategy::Junction {
                junction: "contract".into(),
                column: "author".into()
            }
        );
        assert_eq!(map.strategy("foo", "nope"), &CountStrategy::Zero);
    }
}
