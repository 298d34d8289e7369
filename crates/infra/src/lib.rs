//! Infrastructure layer: catalog storage, read views, and the service that
//! orchestrates domain commands against a store.

pub mod service;
pub mod store;
pub mod views;

pub use service::{CatalogService, NewProduct, ServiceError};
pub use store::{CatalogStore, InMemoryCatalogStore, StoreError};
pub use views::ProductView;

#[cfg(feature = "postgres")]
pub use store::PostgresCatalogStore;
