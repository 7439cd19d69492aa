//! Raw schema declarations: models, attributes, associations and blueprint settings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a relation is presented in a document.
///
/// Unknown mode strings deserialize to `Link`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationMode {
    /// Full record: populated and sideloaded into `included`.
    Record,
    /// Identifiers only.
    Index,
    /// Related link only; nothing is joined.
    #[default]
    #[serde(other)]
    Link,
}

/// Global presentation defaults, one mode per call context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationDefaults {
    #[serde(default)]
    pub list: PresentationMode,
    #[serde(default)]
    pub detail: PresentationMode,
}

/// Override set on a model or on a single association attribute.
/// Either one mode for every context (`"record"`) or per context (`{ "list": "link" }`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresentationOverride {
    Uniform(PresentationMode),
    PerContext {
        #[serde(default)]
        list: Option<PresentationMode>,
        #[serde(default)]
        detail: Option<PresentationMode>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Json,
    #[serde(other)]
    Ref,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttributeMeta {
    #[serde(default)]
    pub presentation: Option<PresentationOverride>,
}

/// One entry of a model's `attributes`. Plain attributes set `type`; associations set
/// `model` (belongs-to) or `collection` (+ optional `via` / `through`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfig {
    #[serde(default, rename = "type")]
    pub type_: Option<AttributeType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub is_in: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub via: Option<String>,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub meta: Option<AttributeMeta>,
}

impl AttributeConfig {
    pub fn is_association(&self) -> bool {
        self.model.is_some() || self.collection.is_some()
    }
}

fn default_primary_key() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Storage identity, camelCase (e.g. `mediaOutlet`).
    pub identity: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Plural path segment override (defaults to the pluralized kebab-case identity).
    #[serde(default)]
    pub plural: Option<String>,
    /// Storage table override (defaults to the snake_case identity).
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub presentation: Option<PresentationOverride>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeConfig>,
}

/// Inputs to link generation: `{protocol}://{host}:{port}{prefix}/{plural}[/{suffix}]`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub prefix: String,
}

impl LinkConfig {
    pub fn protocol(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.ssl { 443 } else { 80 })
    }
}

fn default_limit() -> u32 {
    100
}

fn default_max_limit() -> u32 {
    1000
}

fn default_count_concurrency() -> usize {
    8
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintsConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    /// Upper bound on relationship count batches in flight per request.
    #[serde(default = "default_count_concurrency")]
    pub count_concurrency: usize,
    #[serde(default)]
    pub presentation: PresentationDefaults,
    #[serde(default)]
    pub links: LinkConfig,
}

impl Default for BlueprintsConfig {
    fn default() -> Self {
        BlueprintsConfig {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            count_concurrency: default_count_concurrency(),
            presentation: PresentationDefaults::default(),
            links: LinkConfig::default(),
        }
    }
}

/// All declarations in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub blueprints: BlueprintsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_presentation_falls_back_to_link() {
        let mode: PresentationMode = serde_json::from_str("\"embedded\"").unwrap();
        assert_eq!(mode, PresentationMode::Link);
        let mode: PresentationMode = serde_json::from_str("\"index\"").unwrap();
        assert_eq!(mode, PresentationMode::Index);
    }

    #[test]
    fn test_presentation_override_forms() {
        let uniform: PresentationOverride = serde_json::from_str("\"record\"").unwrap();
        assert_eq!(uniform, PresentationOverride::Uniform(PresentationMode::Record));
        let per: PresentationOverride = serde_json::from_str(r#"{"list":"index"}"#).unwrap();
        assert_eq!(
            per,
            PresentationOverride::PerContext {
                list: Some(PresentationMode::Index),
                detail: None
            }
        );
    }

    #[test]
    fn test_model_config_sails_style() {
        let model: ModelConfig = serde_json::from_value(serde_json::json!({
            "identity": "bar",
            "attributes": {
                "name": { "type": "string", "required": true, "minLength": 1 },
                "foos": { "collection": "foo", "via": "bars", "meta": { "presentation": "record" } },
                "myFoo": { "model": "foo" }
            }
        }))
        .unwrap();
        assert_eq!(model.primary_key, "id");
        assert_eq!(model.attributes.len(), 3);
        assert_eq!(model.attributes["name"].min_length, Some(1));
        assert!(model.attributes["foos"].is_association());
        assert_eq!(model.attributes.get_index(2).map(|(k, _)| k.as_str()), Some("myFoo"));
    }

    #[test]
    fn test_link_config_defaults() {
        let links = LinkConfig::default();
        assert_eq!(links.protocol(), "http");
        assert_eq!(links.host(), "localhost");
        assert_eq!(links.port(), 80);
        let ssl = LinkConfig { ssl: true, ..LinkConfig::default() };
        assert_eq!(ssl.port(), 443);
    }
}
