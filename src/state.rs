//! Shared application state for all routes. Everything here is built once at startup and read
//! concurrently by every request.

use crate::config::{BlueprintsConfig, SchemaRegistry};
use crate::junction::JunctionMap;
use crate::links::LinkGenerator;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<SchemaRegistry>,
    pub junctions: Arc<JunctionMap>,
    pub links: Arc<LinkGenerator>,
    pub settings: Arc<BlueprintsConfig>,
}

impl AppState {
    /// Builds the junction map and link generator from the registry and settings.
    pub fn new(store: Arc<dyn Store>, registry: Arc<SchemaRegistry>, settings: BlueprintsConfig) -> Self {
        let junctions = Arc::new(JunctionMap::build(&registry));
        let links = Arc::new(LinkGenerator::new(&settings.links));
        AppState {
            store,
            registry,
            junctions,
            links,
            settings: Arc::new(settings),
        }
    }
}
