pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

#[cfg(test)]
mod test_support;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use logic::{MergeExecutor, TreeMergePlanner, UniqueConstraintChecker};

// Export all model types
pub use model::*;

pub use store::{InMemoryStore, PostgresRecordStore, RecordStore};

use anyhow::Context;
use axum::Router;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api::handlers::AppContext;
use crate::config::{AppConfig, StoreBackend};

/// Router with its state attached, ready to serve
pub fn app<S: RecordStore + 'static>(store: S, catalog: Arc<dyn SchemaCatalog>) -> Router {
    api::routes::create_router().with_state(Arc::new(AppContext { store, catalog }))
}

/// Load the catalog, open the configured store and serve until shutdown
pub async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    let catalog: Arc<dyn SchemaCatalog> =
        Arc::new(StaticCatalog::from_json_file(&config.catalog.path)?);

    let router = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            app(InMemoryStore::new(catalog.clone()), catalog)
        }
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store =
                PostgresRecordStore::new(&database_url, config.max_connections(), catalog.clone())
                    .await?;
            store.migrate().await?;
            app(store, catalog)
        }
    };

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Aggregate server running on http://{}", bind_address);

    axum::serve(listener, router).await?;

    Ok(())
}
