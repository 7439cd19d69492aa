//! Case conversion between storage identities (camelCase) and wire names (kebab-case, pluralized for paths).

use convert_case::{Case, Casing};
use serde_json::{Map, Value};

/// Convert a storage identifier to its wire form.
/// e.g. "identiField" -> "identi-field", "mediaOutlet" -> "media-outlet"
pub fn to_kebab_case(s: &str) -> String {
    s.to_case(Case::Kebab)
}

/// Convert a wire identifier back to its storage form.
/// e.g. "identi-field" -> "identiField". Identifiers already in camelCase are returned unchanged.
pub fn to_camel_case(s: &str) -> String {
    if !s.contains('-') && !s.contains('_') {
        return s.to_string();
    }
    s.to_case(Case::Camel)
}

/// English plural of a kebab-case name; only the last segment is inflected.
/// e.g. "article" -> "articles", "category" -> "categories", "box" -> "boxes"
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if lower.ends_with("ss")
        || lower.ends_with("sh")
        || lower.ends_with("ch")
        || lower.ends_with('x')
        || lower.ends_with('z')
    {
        return format!("{}es", word);
    }
    if lower.ends_with('s') {
        return word.to_string();
    }
    let mut chars = lower.chars().rev();
    if let (Some('y'), Some(prev)) = (chars.next(), chars.next()) {
        if !"aeiou".contains(prev) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{}s", word)
}

/// Wire type name for a storage identity: "mediaOutlet" -> "media-outlet".
pub fn wire_type(identity: &str) -> String {
    to_kebab_case(identity)
}

/// Path segment for a storage identity: "mediaOutlet" -> "media-outlets".
pub fn wire_plural(identity: &str) -> String {
    pluralize(&to_kebab_case(identity))
}

/// Copy of a JSON object with keys converted from camelCase to kebab-case.
/// Used for attributes leaving the API.
pub fn object_keys_to_kebab_case(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter().map(|(k, v)| (to_kebab_case(k), v.clone())).collect()
}

/// Copy of a JSON object with keys converted from kebab-case to camelCase.
/// Used for request bodies so attribute names match storage names.
pub fn object_keys_to_camel_case(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter().map(|(k, v)| (to_camel_case(k), v.clone())).collect()
}
