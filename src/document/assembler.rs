//! Fetched records -> [`ResourceDocument`]. Pure: reads records, counts and index loads and
//! builds new wire values; nothing fetched is mutated.

use super::*;
use crate::association::ResolvedAssociation;
use crate::case::to_kebab_case;
use crate::config::{AssociationKind, PresentationMode, ResourceType, SchemaRegistry};
use crate::counter::{CountOutcome, RelationshipCounts};
use crate::directive::FieldProjection;
use crate::links::LinkGenerator;
use crate::planner::IndexResults;
use crate::store::{key_string, FetchedRecord, Populated, Record};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataShape {
    /// `data` is the first record or null.
    One,
    Many,
}

pub struct Assembler<'a> {
    pub registry: &'a SchemaRegistry,
    pub links: &'a LinkGenerator,
    pub resource: &'a ResourceType,
    pub resolved: &'a [ResolvedAssociation<'a>],
    pub projection: &'a FieldProjection,
    pub counts: &'a RelationshipCounts,
    pub indexes: &'a IndexResults,
}

fn record_id(resource: &ResourceType, record: &Record) -> String {
    record
        .get(&resource.primary_key)
        .map(key_string)
        .unwrap_or_default()
}

fn identifier(target: &ResourceType, record: &Record) -> ResourceIdentifier {
    ResourceIdentifier {
        id: record_id(target, record),
        type_: target.wire_type.clone(),
    }
}

impl<'a> Assembler<'a> {
    pub fn document(
        &self,
        records: &[FetchedRecord],
        shape: DataShape,
        total: Option<u64>,
        self_link: String,
    ) -> ResourceDocument {
        let records = match shape {
            DataShape::One => &records[..records.len().min(1)],
            DataShape::Many => records,
        };
        let mut seen: HashSet<(String, String)> = records
            .iter()
            .map(|r| (self.resource.wire_type.clone(), record_id(self.resource, &r.record)))
            .collect();

        let primary: Vec<ResourceObject> = records.iter().map(|r| self.resource_object(r)).collect();

        let mut included = Vec::new();
        for fetched in records {
            for a in self.resolved.iter().filter(|a| a.mode == PresentationMode::Record) {
                let (Some(target), Some(populated)) = (
                    self.registry.get(&a.descriptor.target),
                    fetched.populated.get(a.alias()),
                ) else {
                    continue;
                };
                for related in populated.records() {
                    let key = (target.wire_type.clone(), record_id(target, related));
                    if seen.insert(key) {
                        included.push(self.included_object(target, related));
                    }
                }
            }
        }

        let data = match shape {
            DataShape::One => PrimaryData::One(primary.into_iter().next()),
            DataShape::Many => PrimaryData::Many(primary),
        };
        ResourceDocument {
            data,
            included,
            meta: total.map(|total| DocumentMeta { total }),
            links: SelfLink { self_: self_link },
        }
    }

    fn attributes(&self, resource: &ResourceType, record: &Record) -> serde_json::Map<String, Value> {
        resource
            .attributes
            .iter()
            .filter(|a| a.name != resource.primary_key && self.projection.allows(resource, &a.name))
            .filter_map(|a| record.get(&a.name).map(|v| (to_kebab_case(&a.name), v.clone())))
            .collect()
    }

    /// Related href, with the relationship count as meta when one was taken.
    fn related_link(&self, resource: &ResourceType, id: &str, alias: &str) -> LinkValue {
        let href = self.links.related(&resource.plural, id, &to_kebab_case(alias));
        match self.counts.get(&resource.identity, alias, id) {
            Some(CountOutcome::Counted(n)) => LinkValue::Object {
                href,
                meta: CountMeta { count: Some(*n), error: None },
            },
            Some(CountOutcome::Failed(e)) => LinkValue::Object {
                href,
                meta: CountMeta { count: None, error: Some(e.clone()) },
            },
            None => LinkValue::Href(href),
        }
    }

    fn resource_object(&self, fetched: &FetchedRecord) -> ResourceObject {
        let resource = self.resource;
        let id = record_id(resource, &fetched.record);
        let mut relationships = IndexMap::new();
        for a in self.resolved {
            let Some(target) = self.registry.get(&a.descriptor.target) else { continue };
            let relation = to_kebab_case(a.alias());
            let related = self.related_link(resource, &id, a.alias());
            relationships.insert(
                relation,
                RelationshipObject {
                    links: RelatedLink { related },
                    data: self.linkage(a, target, fetched, &id),
                },
            );
        }
        ResourceObject {
            links: SelfLink {
                self_: self.links.resource(&resource.plural, &id),
            },
            attributes: self.attributes(resource, &fetched.record),
            id,
            type_: resource.wire_type.clone(),
            relationships,
        }
    }

    fn linkage(
        &self,
        a: &ResolvedAssociation<'_>,
        target: &ResourceType,
        fetched: &FetchedRecord,
        id: &str,
    ) -> Option<Linkage> {
        if let Some(populated) = fetched.populated.get(a.alias()) {
            return Some(match populated {
                Populated::One(r) => Linkage::One(r.as_ref().map(|r| identifier(target, r))),
                Populated::Many(rs) => Linkage::Many(rs.iter().map(|r| identifier(target, r)).collect()),
            });
        }
        if a.mode != PresentationMode::Index {
            return None;
        }
        match &a.descriptor.kind {
            AssociationKind::BelongsToOne => Some(Linkage::One(
                fetched
                    .record
                    .get(a.alias())
                    .filter(|v| !v.is_null())
                    .map(|fk| ResourceIdentifier {
                        id: key_string(fk),
                        type_: target.wire_type.clone(),
                    }),
            )),
            _ => Some(Linkage::Many(
                self.indexes
                    .get(a.alias())
                    .and_then(|by_owner| by_owner.get(id))
                    .map(|ids| {
                        ids.iter()
                            .map(|v| ResourceIdentifier {
                                id: key_string(v),
                                type_: target.wire_type.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            )),
        }
    }

    /// Included records are one level deep: related links for every association, linkage
    /// only for foreign keys present on the record.
    fn included_object(&self, resource: &ResourceType, record: &Record) -> ResourceObject {
        let id = record_id(resource, record);
        let relationships = resource
            .associations
            .iter()
            .filter_map(|assoc| {
                let target = self.registry.get(&assoc.target)?;
                let relation = to_kebab_case(&assoc.alias);
                let data = match assoc.kind {
                    AssociationKind::BelongsToOne => record.get(&assoc.alias).map(|fk| {
                        Linkage::One((!fk.is_null()).then(|| ResourceIdentifier {
                            id: key_string(fk),
                            type_: target.wire_type.clone(),
                        }))
                    }),
                    _ => None,
                };
                Some((
                    relation,
                    RelationshipObject {
                        links: RelatedLink {
                            related: self.related_link(resource, &id, &assoc.alias),
                        },
                        data,
                    },
                ))
            })
            .collect();
        ResourceObject {
            links: SelfLink {
                self_: self.links.resource(&resource.plural, &id),
            },
            attributes: self.attributes(resource, record),
            id,
            type_: resource.wire_type.clone(),
            relationships,
        }
    }
}
