//! Catalog command/query service.
//!
//! This is the application-level orchestration between HTTP handlers and the
//! store:
//!
//! ```text
//! create_category ─▶ Category::create ─▶ store.insert_category
//!
//! create_product  ─▶ Product::handle(CreateProduct)       (field + business rules)
//!                 ─▶ resolve category ids against the store
//!                 ─▶ apply + store.save_product(Exact(0))
//!
//! link_category   ─▶ parse action ─▶ resolve category
//!                 ─▶ load product ─▶ handle(Add/RemoveCategory)
//!                 ─▶ apply + store.save_product(Exact(loaded_version))
//!                    (reload and retry on version conflict)
//! ```
//!
//! Every check runs before the save, so a rejected request never mutates state.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use storefront_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Event, ExpectedVersion, FieldErrors,
};
use storefront_products::{
    Category, CategoryAction, CategoryId, CreateProduct, NewCategory, Product, ProductCommand,
    ProductDetails, ProductId,
};

use crate::store::{CatalogStore, StoreError};
use crate::views::{ProductView, index_categories};

/// Attempts made for a read-modify-write before reporting a conflict.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Validated-shape input for product creation.
///
/// `category` holds raw ids as sent by the client; they are parsed and
/// resolved by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub details: ProductDetails,
    pub category: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Per-field input errors.
    #[error("invalid fields: {0}")]
    Fields(FieldErrors),

    /// A business rule or action check failed. The message is user-facing.
    #[error("{0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The named resource does not exist (or its id does not parse).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Concurrent updates kept winning the version race.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::Fields(fields) => ServiceError::Fields(fields),
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::InvalidId(_) => ServiceError::NotFound("resource"),
            DomainError::NotFound => ServiceError::NotFound("product"),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

/// Catalog operations over a pluggable store.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl core::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CatalogService").finish_non_exhaustive()
    }
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    // -------------------------
    // Categories
    // -------------------------

    #[instrument(skip(self, input), err)]
    pub async fn create_category(&self, input: NewCategory) -> Result<Category, ServiceError> {
        let id = CategoryId::new(AggregateId::new());
        let category = Category::create(id, input, Utc::now())?;
        self.store.insert_category(category.clone()).await?;

        info!(category_id = %id, category_name = category.category_name(), "category created");
        Ok(category)
    }

    #[instrument(skip(self), err)]
    pub async fn get_category(&self, id: &str) -> Result<Category, ServiceError> {
        let id: CategoryId = id.parse().map_err(|_| ServiceError::NotFound("category"))?;
        self.store
            .get_category(id)
            .await?
            .ok_or(ServiceError::NotFound("category"))
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.store.list_categories().await?)
    }

    // -------------------------
    // Products
    // -------------------------

    /// Create a product.
    ///
    /// Field and business rules are checked first (price, then dates, then
    /// quantity); category ids are resolved afterwards and every unknown or
    /// unparseable id is reported under the `category` field.
    #[instrument(skip(self, input), err)]
    pub async fn create_product(&self, input: NewProduct) -> Result<ProductView, ServiceError> {
        let product_id = ProductId::new(AggregateId::new());

        let mut invalid: Vec<&str> = Vec::new();
        let mut parsed: Vec<(&str, CategoryId)> = Vec::with_capacity(input.category.len());
        for raw in &input.category {
            match raw.parse::<CategoryId>() {
                Ok(id) => parsed.push((raw.as_str(), id)),
                Err(_) => invalid.push(raw.as_str()),
            }
        }
        let category_ids: Vec<CategoryId> = parsed.iter().map(|(_, id)| *id).collect();

        let mut product = Product::empty(product_id);
        let events = product.handle(&ProductCommand::CreateProduct(CreateProduct {
            product_id,
            details: input.details.clone(),
            categories: category_ids.clone(),
            occurred_at: Utc::now(),
        }))?;

        let known = self.store.get_categories(&category_ids).await?;
        invalid.extend(
            parsed
                .iter()
                .filter(|(_, id)| !known.iter().any(|c| c.id_typed() == *id))
                .map(|(raw, _)| *raw),
        );
        if !invalid.is_empty() {
            let mut errors = FieldErrors::new();
            for raw in invalid {
                errors.add("category", format!("Invalid pk \"{raw}\" - object does not exist."));
            }
            return Err(ServiceError::Fields(errors));
        }

        for e in &events {
            product.apply(e);
        }
        self.store
            .save_product(&product, ExpectedVersion::Exact(0))
            .await?;
        log_committed(&product, &events);

        self.render_with(&product, known)
    }

    #[instrument(skip(self), err)]
    pub async fn get_product(&self, id: &str) -> Result<ProductView, ServiceError> {
        let id: ProductId = id.parse().map_err(|_| ServiceError::NotFound("product"))?;
        let product = self.load_product(id).await?;
        self.render(&product).await
    }

    /// List products, optionally keeping only those with a category named
    /// exactly `category`.
    #[instrument(skip(self), err)]
    pub async fn list_products(&self, category: Option<&str>) -> Result<Vec<ProductView>, ServiceError> {
        let categories = index_categories(self.store.list_categories().await?);
        let products = self.store.list_products().await?;

        Ok(products
            .iter()
            .filter_map(|p| ProductView::render(p, &categories))
            .filter(|v| category.is_none_or(|name| v.has_category_named(name)))
            .collect())
    }

    /// Apply an `add`/`remove` action to a product's category set.
    ///
    /// Check order: action (400), product id syntax (404), category (404),
    /// product existence (404). Adding a present category or removing an
    /// absent one succeeds without a write.
    #[instrument(skip(self), err)]
    pub async fn link_category(
        &self,
        product_id: &str,
        category_id: &str,
        action: &str,
    ) -> Result<ProductView, ServiceError> {
        let action: CategoryAction = action.parse()?;
        let product_id: ProductId = product_id
            .parse()
            .map_err(|_| ServiceError::NotFound("product"))?;
        let category_id: CategoryId = category_id
            .parse()
            .map_err(|_| ServiceError::NotFound("category"))?;

        if self.store.get_category(category_id).await?.is_none() {
            return Err(ServiceError::NotFound("category"));
        }

        let product = self
            .dispatch(product_id, |_| action.command(product_id, category_id, Utc::now()))
            .await?;
        self.render(&product).await
    }

    // -------------------------
    // Internals
    // -------------------------

    async fn load_product(&self, id: ProductId) -> Result<Product, ServiceError> {
        self.store
            .get_product(id)
            .await?
            .ok_or(ServiceError::NotFound("product"))
    }

    /// Load, decide, apply, save with an exact version; retry on conflicts.
    async fn dispatch<F>(&self, product_id: ProductId, command: F) -> Result<Product, ServiceError>
    where
        F: Fn(&Product) -> ProductCommand,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut product = self.load_product(product_id).await?;
            let events = product.handle(&command(&product))?;
            if events.is_empty() {
                return Ok(product);
            }

            let expected = ExpectedVersion::Exact(product.version());
            for e in &events {
                product.apply(e);
            }

            match self.store.save_product(&product, expected).await {
                Ok(()) => {
                    log_committed(&product, &events);
                    return Ok(product);
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(%product_id, attempt, %msg, "product changed concurrently; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "product {product_id} kept changing; gave up after {MAX_SAVE_ATTEMPTS} attempts"
        )))
    }

    async fn render(&self, product: &Product) -> Result<ProductView, ServiceError> {
        let ids: Vec<CategoryId> = product.categories().iter().copied().collect();
        let categories = self.store.get_categories(&ids).await?;
        self.render_with(product, categories)
    }

    fn render_with(&self, product: &Product, categories: Vec<Category>) -> Result<ProductView, ServiceError> {
        ProductView::render(product, &index_categories(categories))
            .ok_or(ServiceError::NotFound("product"))
    }
}

fn log_committed<E: Event>(product: &Product, events: &[E]) {
    for e in events {
        info!(
            product_id = %product.id_typed(),
            event_type = e.event_type(),
            version = product.version(),
            "product event committed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalogStore;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(InMemoryCatalogStore::new()))
    }

    async fn category(svc: &CatalogService, name: &str) -> String {
        svc.create_category(NewCategory {
            category_name: Some(name.to_string()),
            description: Some(format!("{name} things")),
            is_active: Some(true),
        })
        .await
        .unwrap()
        .id_typed()
        .to_string()
    }

    fn details() -> ProductDetails {
        ProductDetails {
            name: "Phone".to_string(),
            brand: "OnePlus".to_string(),
            description: None,
            price_in_rs: 1000.0,
            quantity: 5,
            weight_in_kg: None,
            manufacture_date: "2024-01-01".parse().unwrap(),
            expiry_date: "2026-01-01".parse().unwrap(),
        }
    }

    async fn product(svc: &CatalogService, categories: Vec<String>) -> ProductView {
        svc.create_product(NewProduct {
            details: details(),
            category: categories,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn category_id_is_usable_immediately() {
        let svc = service();
        let tech = category(&svc, "Tech").await;

        let view = product(&svc, vec![tech]).await;
        assert_eq!(view.category, vec!["Tech".to_string()]);
        assert_eq!(view.version, 1);
    }

    #[tokio::test]
    async fn missing_category_name_is_a_field_error() {
        let svc = service();
        let err = svc
            .create_category(NewCategory {
                category_name: None,
                description: Some("Missing category name".to_string()),
                is_active: Some(true),
            })
            .await
            .unwrap_err();

        match err {
            ServiceError::Fields(f) => assert!(f.contains("category_name")),
            other => panic!("expected field errors, got {other:?}"),
        }
        assert!(svc.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn business_rules_reject_before_anything_is_stored() {
        let svc = service();
        let tech = category(&svc, "Electronics").await;

        let mut bad_price = details();
        bad_price.price_in_rs = -500.0;
        let err = svc
            .create_product(NewProduct { details: bad_price, category: vec![tech.clone()] })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m == "Price cannot be negative"));

        let mut bad_dates = details();
        bad_dates.manufacture_date = "2024-05-01".parse().unwrap();
        bad_dates.expiry_date = "2024-01-01".parse().unwrap();
        let err = svc
            .create_product(NewProduct { details: bad_dates, category: vec![tech] })
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::Validation(ref m) if m == "Expiry date cannot be before manufacture date")
        );

        assert!(svc.list_products(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_initial_categories_are_rejected() {
        let svc = service();
        let real = category(&svc, "Real").await;
        let ghost = CategoryId::new(AggregateId::new()).to_string();

        let err = svc
            .create_product(NewProduct {
                details: details(),
                category: vec![real, ghost.clone(), "not-an-id".to_string()],
            })
            .await
            .unwrap_err();

        match err {
            ServiceError::Fields(f) => {
                let messages = f.messages("category");
                assert_eq!(messages.len(), 2);
                assert!(messages.iter().any(|m| m.contains(&ghost)));
                assert!(messages.iter().any(|m| m.contains("not-an-id")));
            }
            other => panic!("expected field errors, got {other:?}"),
        }
        assert!(svc.list_products(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_then_remove_restores_names() {
        let svc = service();
        let tech = category(&svc, "Tech").await;
        let mobiles = category(&svc, "Mobiles").await;
        let p = product(&svc, vec![tech]).await;
        let id = p.product_id.to_string();

        let added = svc.link_category(&id, &mobiles, "add").await.unwrap();
        let mut names = added.category.clone();
        names.sort();
        assert_eq!(names, vec!["Mobiles", "Tech"]);

        let removed = svc.link_category(&id, &mobiles, "remove").await.unwrap();
        assert_eq!(removed.category, p.category);
        assert_eq!(svc.get_product(&id).await.unwrap().category, vec!["Tech"]);
    }

    #[tokio::test]
    async fn repeated_add_does_not_bump_version() {
        let svc = service();
        let tech = category(&svc, "Tech").await;
        let mobiles = category(&svc, "Mobiles").await;
        let id = product(&svc, vec![tech]).await.product_id.to_string();

        let once = svc.link_category(&id, &mobiles, "add").await.unwrap();
        let twice = svc.link_category(&id, &mobiles, "add").await.unwrap();
        assert_eq!(once.category, twice.category);
        assert_eq!(once.version, twice.version);
    }

    #[tokio::test]
    async fn removing_a_non_member_succeeds() {
        let svc = service();
        let tech = category(&svc, "Tech").await;
        let other = category(&svc, "Other").await;
        let id = product(&svc, vec![tech]).await.product_id.to_string();

        let view = svc.link_category(&id, &other, "remove").await.unwrap();
        assert_eq!(view.category, vec!["Tech"]);
        assert_eq!(view.version, 1);
    }

    #[tokio::test]
    async fn invalid_action_is_rejected_even_for_missing_category() {
        let svc = service();
        let tech = category(&svc, "X").await;
        let id = product(&svc, vec![tech.clone()]).await.product_id.to_string();

        let err = svc.link_category(&id, &tech, "foobar").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let ghost = CategoryId::new(AggregateId::new()).to_string();
        let err = svc.link_category(&id, &ghost, "invalid_action").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let view = svc.get_product(&id).await.unwrap();
        assert_eq!(view.category, vec!["X"]);
        assert_eq!(view.version, 1);
    }

    #[tokio::test]
    async fn unknown_category_is_not_found() {
        let svc = service();
        let tech = category(&svc, "Electronics").await;
        let id = product(&svc, vec![tech]).await.product_id.to_string();

        let ghost = CategoryId::new(AggregateId::new()).to_string();
        for action in ["add", "remove"] {
            let err = svc.link_category(&id, &ghost, action).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound("category")));
        }

        // Object-id style strings that are not valid ids are "not found" too.
        let err = svc
            .link_category(&id, "65a1f0c2e4b0a1b2c3d4e5f6", "add")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("category")));

        assert_eq!(svc.get_product(&id).await.unwrap().category, vec!["Electronics"]);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let svc = service();
        let tech = category(&svc, "Tech").await;
        let ghost = ProductId::new(AggregateId::new()).to_string();

        assert!(matches!(svc.get_product(&ghost).await, Err(ServiceError::NotFound("product"))));
        assert!(matches!(svc.get_product("nope").await, Err(ServiceError::NotFound("product"))));
        assert!(matches!(
            svc.link_category(&ghost, &tech, "add").await,
            Err(ServiceError::NotFound("product"))
        ));
    }

    #[tokio::test]
    async fn list_filters_by_category_name() {
        let svc = service();
        let tech = category(&svc, "Tech").await;
        let food = category(&svc, "Food").await;
        product(&svc, vec![tech.clone()]).await;
        product(&svc, vec![food]).await;
        product(&svc, vec![tech]).await;

        assert_eq!(svc.list_products(None).await.unwrap().len(), 3);
        assert_eq!(svc.list_products(Some("Tech")).await.unwrap().len(), 2);
        assert!(svc.list_products(Some("tech")).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_are_not_lost() {
        let svc = service();
        let base = category(&svc, "Base").await;
        let id = product(&svc, vec![base]).await.product_id.to_string();

        let mut names = Vec::new();
        for i in 0..8 {
            names.push(category(&svc, &format!("C{i}")).await);
        }

        let mut handles = Vec::new();
        for cat in names {
            let svc = svc.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                // Retry past exhausted attempts; every add must land eventually.
                loop {
                    match svc.link_category(&id, &cat, "add").await {
                        Ok(_) => break,
                        Err(ServiceError::Conflict(_)) => tokio::task::yield_now().await,
                        Err(e) => panic!("unexpected error: {e:?}"),
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let view = svc.get_product(&id).await.unwrap();
        assert_eq!(view.category.len(), 9);
        assert_eq!(view.version, 9);
    }
}
