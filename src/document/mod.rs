//! JSON:API document model and the assembler that builds it from fetched records.

mod assembler;

pub use assembler::{Assembler, DataShape};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceDocument {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DocumentMeta>,
    pub links: SelfLink,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Option<ResourceObject>),
    Many(Vec<ResourceObject>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentMeta {
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelfLink {
    #[serde(rename = "self")]
    pub self_: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceObject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipObject>,
    pub links: SelfLink,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelationshipObject {
    pub links: RelatedLink,
    /// Absent for `link` presentation; `null` for an empty to-one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelatedLink {
    pub related: LinkValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LinkValue {
    Href(String),
    Object { href: String, meta: CountMeta },
}

/// `count` is null when counting failed; `error` then carries the reason.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountMeta {
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let doc = ResourceDocument {
            data: PrimaryData::One(None),
            included: Vec::new(),
            meta: None,
            links: SelfLink { self_: "http://localhost:80/foos/9".into() },
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({ "data": null, "links": { "self": "http://localhost:80/foos/9" } })
        );

        let rel = RelationshipObject {
            links: RelatedLink {
                related: LinkValue::Object {
                    href: "h".into(),
                    meta: CountMeta { count: None, error: Some("down".into()) },
                },
            },
            data: Some(Linkage::One(None)),
        };
        assert_eq!(
            serde_json::to_value(&rel).unwrap(),
            json!({ "links": { "related": { "href": "h", "meta": { "count": null, "error": "down" } } }, "data": null })
        );
    }
}
