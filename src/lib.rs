//! JSON:API blueprints: schema-driven resource endpoints with include sideloading, sparse
//! fieldsets, configurable relationship presentation and relationship counts.

pub mod association;
pub mod case;
pub mod config;
pub mod counter;
pub mod directive;
pub mod document;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod junction;
pub mod links;
pub mod planner;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_dir, resolve, BlueprintsConfig, FullConfig, SchemaRegistry};
pub use error::{ApiError, ConfigError, StoreError};
pub use routes::{app, common_routes, resource_routes};
pub use service::BlueprintService;
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
