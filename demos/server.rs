//! Example server: loads declarations from CONFIG_PATH, serves them from Postgres when
//! DATABASE_URL is set and from an in-memory store otherwise.

use jsonapi_blueprints::{app, load_from_dir, resolve, AppState, MemoryStore, PgStore, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jsonapi_blueprints=info".parse()?))
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "demos/config".into());
    let config = load_from_dir(&config_path).await?;
    let registry = Arc::new(resolve(&config)?);

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            let schema = std::env::var("DATABASE_SCHEMA").unwrap_or_else(|_| "public".into());
            Arc::new(PgStore::new(pool, registry.clone(), schema))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new(registry.clone()))
        }
    };

    let state = AppState::new(store, registry, config.blueprints);
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
