//! Build the schema registry from declarations, and load declarations from disk / env.

use crate::case::{to_kebab_case, wire_plural, wire_type};
use crate::config::resolved::{
    AssociationDescriptor, AssociationKind, AttributeDescriptor, JunctionSide, ResourceType,
    SchemaRegistry,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Build the registry from full config (validates first). Junction types are synthesized for
/// collection associations that are not a direct back-reference and have no `through` model.
pub fn resolve(config: &FullConfig) -> Result<SchemaRegistry, ConfigError> {
    validate(config)?;
    let models: HashMap<&str, &ModelConfig> = config
        .models
        .iter()
        .map(|m| (m.identity.as_str(), m))
        .collect();

    let mut types = Vec::with_capacity(config.models.len());
    let mut junctions: IndexMap<String, [JunctionSide; 2]> = IndexMap::new();

    for m in &config.models {
        let mut attributes: Vec<AttributeDescriptor> = m
            .attributes
            .iter()
            .filter(|(_, a)| !a.is_association())
            .map(|(name, a)| AttributeDescriptor {
                name: name.clone(),
                type_: a.type_.unwrap_or(AttributeType::String),
                required: a.required,
                unique: a.unique,
                min_length: a.min_length,
                max_length: a.max_length,
                is_in: a.is_in.clone(),
            })
            .collect();
        if !attributes.iter().any(|a| a.name == m.primary_key) {
            attributes.insert(
                0,
                AttributeDescriptor {
                    name: m.primary_key.clone(),
                    type_: AttributeType::Number,
                    required: false,
                    unique: true,
                    min_length: None,
                    max_length: None,
                    is_in: None,
                },
            );
        }

        let mut associations = Vec::new();
        for (alias, a) in m.attributes.iter().filter(|(_, a)| a.is_association()) {
            let presentation = a.meta.as_ref().and_then(|meta| meta.presentation);
            if let Some(target) = &a.model {
                associations.push(AssociationDescriptor {
                    alias: alias.clone(),
                    target: target.clone(),
                    via: a.via.clone(),
                    kind: AssociationKind::BelongsToOne,
                    presentation,
                });
                continue;
            }
            let Some(target) = &a.collection else { continue };
            let kind = collection_kind(m, alias, a, &models, &mut junctions)?;
            associations.push(AssociationDescriptor {
                alias: alias.clone(),
                target: target.clone(),
                via: a.via.clone(),
                kind,
                presentation,
            });
        }

        types.push(ResourceType {
            identity: m.identity.clone(),
            primary_key: m.primary_key.clone(),
            wire_type: wire_type(&m.identity),
            plural: m.plural.clone().unwrap_or_else(|| wire_plural(&m.identity)),
            table_name: m
                .table_name
                .clone()
                .unwrap_or_else(|| to_kebab_case(&m.identity).replace('-', "_")),
            user_facing: true,
            attributes,
            associations,
            presentation: m.presentation,
            junction_sides: None,
        });
    }

    for (identity, sides) in junctions {
        types.push(junction_type(identity, sides));
    }

    let registry = SchemaRegistry::new(types, config.blueprints.presentation);
    tracing::info!(types = registry.len(), "schema registry built");
    Ok(registry)
}

fn collection_kind(
    owner: &ModelConfig,
    alias: &str,
    attr: &AttributeConfig,
    models: &HashMap<&str, &ModelConfig>,
    junctions: &mut IndexMap<String, [JunctionSide; 2]>,
) -> Result<AssociationKind, ConfigError> {
    let target = attr.collection.as_deref().unwrap_or_default();
    let invalid = |reason: &str| ConfigError::InvalidAssociation {
        model: owner.identity.clone(),
        alias: alias.to_string(),
        reason: reason.to_string(),
    };

    if let Some(through) = &attr.through {
        let through_model = models
            .get(through.as_str())
            .ok_or_else(|| invalid("unknown through model"))?;
        let owner_column = attr.via.clone().ok_or_else(|| invalid("through requires via"))?;
        let target_column = through_model
            .attributes
            .iter()
            .find(|(name, a)| a.model.as_deref() == Some(target) && **name != owner_column)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| invalid("through model has no belongs-to for the target"))?;
        return Ok(AssociationKind::ManyToManyThroughJunction {
            junction: through.clone(),
            owner_column,
            target_column,
        });
    }

    let back = attr
        .via
        .as_ref()
        .and_then(|via| models.get(target).and_then(|t| t.attributes.get(via)));
    if let (Some(via), Some(back)) = (&attr.via, back) {
        if back.model.is_some() {
            return Ok(AssociationKind::DirectMany { via: via.clone() });
        }
    }

    let owner_side = JunctionSide {
        resource: owner.identity.clone(),
        alias: Some(alias.to_string()),
        column: format!("{}_{}", owner.identity, alias),
    };
    let mut target_side = JunctionSide {
        resource: target.to_string(),
        alias: attr.via.clone(),
        column: format!("{}_{}", target, attr.via.as_deref().unwrap_or(alias)),
    };
    if target_side.column == owner_side.column {
        target_side.column.push_str("_ref");
    }
    let (owner_column, target_column) = (owner_side.column.clone(), target_side.column.clone());
    let mut sides = [owner_side, target_side];
    sides.sort_by(|a, b| a.column.cmp(&b.column));
    let identity = format!("{}__{}", sides[0].column, sides[1].column);
    junctions.entry(identity.clone()).or_insert(sides);

    Ok(AssociationKind::ManyToManyThroughJunction {
        junction: identity,
        owner_column,
        target_column,
    })
}

fn junction_type(identity: String, sides: [JunctionSide; 2]) -> ResourceType {
    let associations = sides
        .iter()
        .map(|side| AssociationDescriptor {
            alias: side.column.clone(),
            target: side.resource.clone(),
            via: None,
            kind: AssociationKind::BelongsToOne,
            presentation: None,
        })
        .collect();
    ResourceType {
        wire_type: identity.clone(),
        plural: identity.clone(),
        table_name: identity.clone(),
        identity,
        primary_key: "id".into(),
        user_facing: false,
        attributes: vec![AttributeDescriptor {
            name: "id".into(),
            type_: AttributeType::Number,
            required: false,
            unique: true,
            min_length: None,
            max_length: None,
            is_in: None,
        }],
        associations,
        presentation: None,
        junction_sides: Some(sides),
    }
}

/// Load declarations from a directory: `models.json` (array of models) and optional
/// `blueprints.json`. Link settings are then overridden from the environment.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let models_raw = tokio::fs::read_to_string(dir.join("models.json"))
        .await
        .map_err(|e| ConfigError::Load(format!("models.json: {}", e)))?;
    let models: Vec<ModelConfig> =
        serde_json::from_str(&models_raw).map_err(|e| ConfigError::Load(e.to_string()))?;
    let mut blueprints = match tokio::fs::read_to_string(dir.join("blueprints.json")).await {
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BlueprintsConfig::default(),
        Err(e) => return Err(ConfigError::Load(format!("blueprints.json: {}", e))),
    };
    blueprints.links.apply_env()?;
    tracing::debug!(dir = %dir.display(), models = models.len(), "config loaded");
    Ok(FullConfig { models, blueprints })
}

impl LinkConfig {
    /// Override link settings from `JSONAPI_HOST`, `JSONAPI_PORT`, `JSONAPI_SSL`, `JSONAPI_LINK_PREFIX`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("JSONAPI_HOST") {
            self.host = Some(host);
        }
        if let Ok(port) = std::env::var("JSONAPI_PORT") {
            let port = port
                .parse()
                .map_err(|_| ConfigError::Load(format!("invalid JSONAPI_PORT: {}", port)))?;
            self.port = Some(port);
        }
        if let Ok(ssl) = std::env::var("JSONAPI_SSL") {
            self.ssl = matches!(ssl.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(prefix) = std::env::var("JSONAPI_LINK_PREFIX") {
            self.prefix = prefix;
        }
        Ok(())
    }
}
