use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use storefront_core::{AggregateRoot, ExpectedVersion};
use storefront_products::{Category, CategoryId, Product, ProductId};

use super::{CatalogStore, StoreError};

/// In-memory catalog store.
///
/// Intended for tests/dev. Version checks and writes happen under one write
/// lock, so concurrent saves of the same product cannot both succeed.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    categories: RwLock<HashMap<CategoryId, Category>>,
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_category(&self, category: Category) -> Result<(), StoreError> {
        let mut map = self.categories.write().map_err(|_| poisoned("categories"))?;
        map.insert(category.id_typed(), category);
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let map = self.categories.read().map_err(|_| poisoned("categories"))?;
        Ok(map.get(&id).cloned())
    }

    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, StoreError> {
        let map = self.categories.read().map_err(|_| poisoned("categories"))?;
        let mut found: Vec<Category> = ids.iter().filter_map(|id| map.get(id).cloned()).collect();
        found.sort_by_key(Category::id_typed);
        found.dedup_by_key(|c| c.id_typed());
        Ok(found)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let map = self.categories.read().map_err(|_| poisoned("categories"))?;
        let mut all: Vec<Category> = map.values().cloned().collect();
        all.sort_by_key(Category::id_typed);
        Ok(all)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let map = self.products.read().map_err(|_| poisoned("products"))?;
        Ok(map.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let map = self.products.read().map_err(|_| poisoned("products"))?;
        let mut all: Vec<Product> = map.values().cloned().collect();
        all.sort_by_key(Product::id_typed);
        Ok(all)
    }

    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut map = self.products.write().map_err(|_| poisoned("products"))?;

        let current = map.get(&product.id_typed()).map(|p| p.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "product {}: expected {expected:?}, found {current}",
                product.id_typed()
            )));
        }

        map.insert(product.id_typed(), product.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storefront_core::{Aggregate, AggregateId};
    use storefront_products::{CreateProduct, NewCategory, ProductCommand, ProductDetails};

    fn category(name: &str) -> Category {
        Category::create(
            CategoryId::new(AggregateId::new()),
            NewCategory {
                category_name: Some(name.to_string()),
                description: None,
                is_active: Some(true),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn product(categories: Vec<CategoryId>) -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: ProductDetails {
                    name: "Item1".to_string(),
                    brand: "BrandA".to_string(),
                    description: None,
                    price_in_rs: 100.0,
                    quantity: 1,
                    weight_in_kg: None,
                    manufacture_date: "2024-01-01".parse().unwrap(),
                    expiry_date: "2025-01-01".parse().unwrap(),
                },
                categories,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            product.apply(e);
        }
        product
    }

    #[tokio::test]
    async fn stores_and_loads_categories() {
        let store = InMemoryCatalogStore::new();
        let alpha = category("Alpha");
        let beta = category("Beta");
        store.insert_category(alpha.clone()).await.unwrap();
        store.insert_category(beta.clone()).await.unwrap();

        assert_eq!(store.get_category(alpha.id_typed()).await.unwrap(), Some(alpha.clone()));
        assert_eq!(store.list_categories().await.unwrap().len(), 2);

        let missing = CategoryId::new(AggregateId::new());
        let found = store
            .get_categories(&[beta.id_typed(), missing, alpha.id_typed(), beta.id_typed()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn save_requires_matching_version() {
        let store = InMemoryCatalogStore::new();
        let p = product(vec![]);

        // New products are expected at version 0.
        let err = store.save_product(&p, ExpectedVersion::Exact(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store.save_product(&p, ExpectedVersion::Exact(0)).await.unwrap();
        let err = store.save_product(&p, ExpectedVersion::Exact(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store.save_product(&p, ExpectedVersion::Exact(p.version())).await.unwrap();
        assert_eq!(store.get_product(p.id_typed()).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn unknown_product_is_none() {
        let store = InMemoryCatalogStore::new();
        let id = ProductId::new(AggregateId::new());
        assert!(store.get_product(id).await.unwrap().is_none());
        assert!(store.list_products().await.unwrap().is_empty());
    }
}
