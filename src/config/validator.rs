//! Schema validation: referential integrity of models and associations.

use crate::case::wire_plural;
use crate::config::{FullConfig, ModelConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut identities = HashSet::new();
    let mut plurals = HashSet::new();
    for m in &config.models {
        if m.identity.trim().is_empty() {
            return Err(ConfigError::Load("model identity must not be empty".into()));
        }
        if !identities.insert(m.identity.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "model",
                name: m.identity.clone(),
            });
        }
        let plural = m.plural.clone().unwrap_or_else(|| wire_plural(&m.identity));
        if !plurals.insert(plural.clone()) {
            return Err(ConfigError::Duplicate {
                kind: "plural",
                name: plural,
            });
        }
    }

    let models: HashMap<&str, &ModelConfig> = config
        .models
        .iter()
        .map(|m| (m.identity.as_str(), m))
        .collect();

    for m in &config.models {
        if let Some(pk) = m.attributes.get(&m.primary_key) {
            if pk.is_association() {
                return Err(ConfigError::InvalidPrimaryKey {
                    model: m.identity.clone(),
                    attribute: m.primary_key.clone(),
                });
            }
        }

        for (alias, attr) in &m.attributes {
            let invalid = |reason: &str| ConfigError::InvalidAssociation {
                model: m.identity.clone(),
                alias: alias.clone(),
                reason: reason.to_string(),
            };
            if attr.model.is_some() && attr.collection.is_some() {
                return Err(invalid("declares both model and collection"));
            }
            if let Some(target) = &attr.model {
                if !models.contains_key(target.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "model",
                        id: target.clone(),
                    });
                }
            }
            let Some(target) = &attr.collection else { continue };
            let Some(target_model) = models.get(target.as_str()) else {
                return Err(ConfigError::MissingReference {
                    kind: "model",
                    id: target.clone(),
                });
            };
            if let Some(through) = &attr.through {
                let Some(through_model) = models.get(through.as_str()) else {
                    return Err(ConfigError::MissingReference {
                        kind: "through model",
                        id: through.clone(),
                    });
                };
                let Some(via) = &attr.via else {
                    return Err(invalid("through requires via"));
                };
                match through_model.attributes.get(via) {
                    Some(back) if back.model.as_deref() == Some(m.identity.as_str()) => {}
                    _ => return Err(invalid("via must be a belongs-to on the through model")),
                }
                continue;
            }
            if let Some(via) = &attr.via {
                match target_model.attributes.get(via) {
                    Some(back) if back.model.as_deref() == Some(m.identity.as_str()) => {}
                    Some(back) if back.collection.as_deref() == Some(m.identity.as_str()) => {}
                    _ => return Err(invalid("via does not name an association back to this model")),
                }
            }
        }
    }

    Ok(())
}
