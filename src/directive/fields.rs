//! Sparse fieldsets: `fields[<plural>]=a,b`.

use crate::case::to_camel_case;
use crate::config::{AssociationKind, ResourceType};
use std::collections::HashMap;

/// Type identity -> projected attribute names (storage case). A type without an entry keeps
/// all of its attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldProjection {
    by_type: HashMap<String, Vec<String>>,
}

impl FieldProjection {
    pub fn get(&self, identity: &str) -> Option<&[String]> {
        self.by_type.get(identity).map(Vec::as_slice)
    }

    /// Whether `attribute` of `resource` is emitted. The primary key always is.
    pub fn allows(&self, resource: &ResourceType, attribute: &str) -> bool {
        if attribute == resource.primary_key {
            return true;
        }
        match self.get(&resource.identity) {
            Some(fields) => fields.iter().any(|f| f == attribute),
            None => true,
        }
    }

    /// Columns to fetch for `resource`: projected attributes plus every foreign key, since
    /// relationship linkage is read from them. None when nothing is projected.
    pub fn select_for(&self, resource: &ResourceType) -> Option<Vec<String>> {
        let fields = self.get(&resource.identity)?;
        let mut select: Vec<String> = fields.to_vec();
        select.extend(
            resource
                .associations
                .iter()
                .filter(|a| a.kind == AssociationKind::BelongsToOne)
                .map(|a| a.alias.clone()),
        );
        Some(select)
    }
}

/// Build the projection from `(plural, comma list)` pairs. Only the primary type and the
/// included types are honored; other keys are ignored, as are names that are not plain
/// attributes of the type.
pub fn parse_fields(
    raw: &[(String, String)],
    resource: &ResourceType,
    included: &[&ResourceType],
) -> FieldProjection {
    let mut by_type: HashMap<String, Vec<String>> = HashMap::new();
    for (plural, list) in raw {
        let Some(target) = std::iter::once(resource)
            .chain(included.iter().copied())
            .find(|t| t.plural == *plural)
        else {
            continue;
        };
        let entry = by_type.entry(target.identity.clone()).or_default();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let name = to_camel_case(name);
            if target.attribute(&name).is_some() && !entry.contains(&name) {
                entry.push(name);
            }
        }
    }
    FieldProjection { by_type }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::tests::registry;
    use pretty_assertions::assert_eq;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_primary_and_included_types_only() {
        let r = registry();
        let article = r.get("article").unwrap();
        let author = r.get("author").unwrap();
        let p = parse_fields(
            &[pair("articles", "title"), pair("authors", "name"), pair("comments", "text")],
            article,
            &[author],
        );
        assert_eq!(p.get("article"), Some(&["title".to_string()][..]));
        assert_eq!(p.get("author"), Some(&["name".to_string()][..]));
        assert_eq!(p.get("comment"), None);
        assert!(p.allows(article, "id"));
        assert!(!p.allows(article, "body"));
    }

    #[test]
    fn test_wire_case_names_and_foreign_keys_in_select() {
        let r = registry();
        let bar = r.get("bar").unwrap();
        let p = parse_fields(&[pair("bars", "identi-field,name,bogus")], bar, &[]);
        assert_eq!(
            p.get("bar"),
            Some(&["identiField".to_string(), "name".to_string()][..])
        );
        assert_eq!(
            p.select_for(bar),
            Some(vec!["identiField".to_string(), "name".to_string(), "myFoo".to_string()])
        );
    }
}
