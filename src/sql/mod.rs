//! Postgres SQL generation for [`PgStore`](crate::store::PgStore): identifiers from the
//! registry only, values as bind parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
