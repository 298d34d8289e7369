//! Catalog persistence boundary.
//!
//! The service layer only talks to `CatalogStore`; in-memory and Postgres
//! implementations live next to it.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryCatalogStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalogStore;

use async_trait::async_trait;
use thiserror::Error;

use storefront_core::ExpectedVersion;
use storefront_products::{Category, CategoryId, Product, ProductId};

/// Store operation error.
///
/// These are infrastructure errors, as opposed to domain errors (validation,
/// invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored product version did not match the expected one.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A persisted record could not be turned back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Async key/value style storage for categories and products.
///
/// Products carry their category set; implementations must persist it with
/// set semantics (no duplicates, insert/delete by id).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_category(&self, category: Category) -> Result<(), StoreError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Load the categories among `ids` that exist, ordered by id.
    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, StoreError>;

    /// All categories ordered by id.
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// All products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Insert or replace a product.
    ///
    /// `expected` is compared against the stored version (0 when the product
    /// does not exist yet); a mismatch fails with `StoreError::Concurrency`
    /// and leaves the stored product untouched.
    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
}
