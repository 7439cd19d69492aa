//! Request extractors.

mod negotiate;
mod query;
pub use negotiate::{check_accept, check_content_type, JsonApiBody, Negotiated};
pub use query::QueryParams;
