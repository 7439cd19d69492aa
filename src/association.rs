//! Per-request association configuration: which presentation mode each relation gets and
//! whether it must be joined.

use crate::config::{
    AssociationDescriptor, PresentationDefaults, PresentationMode, PresentationOverride,
    ResourceType,
};

/// Call context a presentation mode is resolved for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentationContext {
    List,
    Detail,
}

#[derive(Clone, Debug)]
pub struct ResolvedAssociation<'a> {
    pub descriptor: &'a AssociationDescriptor,
    pub mode: PresentationMode,
    /// True when the related records are fetched together with the primary records.
    pub populate: bool,
}

impl ResolvedAssociation<'_> {
    pub fn alias(&self) -> &str {
        &self.descriptor.alias
    }
}

fn apply(mode: PresentationMode, over: Option<&PresentationOverride>, ctx: PresentationContext) -> PresentationMode {
    match over {
        None => mode,
        Some(PresentationOverride::Uniform(m)) => *m,
        Some(PresentationOverride::PerContext { list, detail }) => {
            let picked = match ctx {
                PresentationContext::List => list,
                PresentationContext::Detail => detail,
            };
            picked.unwrap_or(mode)
        }
    }
}

/// Resolve every association of `resource`: global default, then the type override, then the
/// attribute override, then `record` for included aliases.
pub fn resolve<'a>(
    defaults: &PresentationDefaults,
    resource: &'a ResourceType,
    include: &[String],
    ctx: PresentationContext,
) -> Vec<ResolvedAssociation<'a>> {
    let base = match ctx {
        PresentationContext::List => defaults.list,
        PresentationContext::Detail => defaults.detail,
    };
    let type_mode = apply(base, resource.presentation.as_ref(), ctx);
    resource
        .associations
        .iter()
        .map(|descriptor| {
            let mut mode = apply(type_mode, descriptor.presentation.as_ref(), ctx);
            if include.iter().any(|a| *a == descriptor.alias) {
                mode = PresentationMode::Record;
            }
            let populate = mode == PresentationMode::Record
                || (descriptor.is_many_to_many() && mode != PresentationMode::Link);
            ResolvedAssociation {
                descriptor,
                mode,
                populate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve as resolve_registry, FullConfig};
    use serde_json::json;
    use yare::parameterized;

    fn registry() -> crate::config::SchemaRegistry {
        resolve_registry(&FullConfig {
            models: serde_json::from_value(json!([
                { "identity": "foo", "presentation": { "detail": "index" }, "attributes": {
                    "bars": { "collection": "bar", "via": "foos" },
                    "myBar": { "model": "bar", "meta": { "presentation": "record" } }
                } },
                { "identity": "bar", "attributes": {
                    "foos": { "collection": "foo", "via": "bars" }
                } }
            ]))
            .unwrap(),
            ..FullConfig::default()
        })
        .unwrap()
    }

    fn mode_of(ctx: PresentationContext, include: &[&str], alias: &str) -> (PresentationMode, bool) {
        let r = registry();
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let resolved = resolve(&r.presentation, r.get("foo").unwrap(), &include, ctx);
        let a = resolved.iter().find(|a| a.alias() == alias).unwrap();
        (a.mode, a.populate)
    }

    #[parameterized(
        list_default = { PresentationContext::List, &[], "bars", PresentationMode::Link, false },
        detail_type_override = { PresentationContext::Detail, &[], "bars", PresentationMode::Index, true },
        attribute_override = { PresentationContext::List, &[], "myBar", PresentationMode::Record, true },
        include_forces_record = { PresentationContext::List, &["bars"], "bars", PresentationMode::Record, true },
    )]
    fn test_merge_order(
        ctx: PresentationContext,
        include: &[&str],
        alias: &str,
        mode: PresentationMode,
        populate: bool,
    ) {
        assert_eq!(mode_of(ctx, include, alias), (mode, populate));
    }

    #[test]
    fn test_global_defaults_apply_when_nothing_overrides() {
        let r = registry();
        let defaults = PresentationDefaults {
            list: PresentationMode::Index,
            detail: PresentationMode::Link,
        };
        let resolved = resolve(&defaults, r.get("bar").unwrap(), &[], PresentationContext::List);
        assert_eq!(resolved[0].mode, PresentationMode::Index);
        assert!(resolved[0].populate);
    }
}
