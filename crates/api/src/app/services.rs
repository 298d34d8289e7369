//! Service wiring: picks the catalog store from config and builds the
//! services shared by all handlers.

use std::sync::Arc;

use storefront_infra::{CatalogService, CatalogStore, InMemoryCatalogStore};

use crate::config::{ApiConfig, StoreConfig};

/// Services available to every handler through `Extension<Arc<AppServices>>`.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
}

impl AppServices {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog: CatalogService::new(store),
        }
    }
}

/// In-memory wiring (dev/test).
pub fn in_memory_services() -> AppServices {
    AppServices::new(Arc::new(InMemoryCatalogStore::new()))
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    match &config.store {
        StoreConfig::InMemory => Ok(in_memory_services()),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => build_persistent_services(database_url, *max_connections).await,
    }
}

#[cfg(feature = "postgres")]
async fn build_persistent_services(
    database_url: &str,
    max_connections: u32,
) -> anyhow::Result<AppServices> {
    use anyhow::Context;
    use storefront_infra::PostgresCatalogStore;

    let store = PostgresCatalogStore::connect(database_url, max_connections)
        .await
        .context("failed to open the Postgres catalog store")?;
    tracing::info!(max_connections, "using Postgres catalog store");
    Ok(AppServices::new(Arc::new(store)))
}

#[cfg(not(feature = "postgres"))]
async fn build_persistent_services(
    _database_url: &str,
    _max_connections: u32,
) -> anyhow::Result<AppServices> {
    tracing::warn!(
        "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
    );
    Ok(in_memory_services())
}
