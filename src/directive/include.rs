//! `include` directive: one-level relation aliases to sideload.

use crate::case::to_camel_case;
use crate::config::ResourceType;
use crate::error::ApiError;

/// Ordered, deduplicated relation aliases (storage names) of the primary type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeRequest {
    aliases: Vec<String>,
}

impl IncludeRequest {
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.iter().any(|a| a == alias)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Parse a comma-separated include list. Every token must name an association of `resource`
/// (wire or storage case); all unknown tokens are reported together. Nested paths are not
/// supported.
pub fn parse_include(raw: Option<&str>, resource: &ResourceType) -> Result<IncludeRequest, ApiError> {
    let Some(raw) = raw else {
        return Ok(IncludeRequest::default());
    };
    let mut aliases: Vec<String> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let alias = to_camel_case(token);
        if token.contains('.') || resource.association(&alias).is_none() {
            if !unknown.iter().any(|u| u == token) {
                unknown.push(token.to_string());
            }
            continue;
        }
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    if !unknown.is_empty() {
        return Err(ApiError::UnsupportedInclude(unknown));
    }
    Ok(IncludeRequest { aliases })
}
