//! Read views handed to the API layer.
//!
//! Products store category ids; clients see category names.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use storefront_core::{AggregateRoot, Entity};
use storefront_products::{Category, CategoryId, Product, ProductId};

/// Queryable product view with categories resolved to names.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductView {
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub description: Option<String>,
    pub price_in_rs: f64,
    pub quantity: i64,
    pub weight_in_kg: Option<f64>,
    pub manufacture_date: NaiveDate,
    pub expiry_date: NaiveDate,
    /// Category names in the product's id order.
    pub category: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl ProductView {
    /// Render `product` using `categories` to resolve names.
    ///
    /// Ids without a matching category are skipped. Returns `None` for a
    /// product that was never created.
    pub fn render(product: &Product, categories: &HashMap<CategoryId, Category>) -> Option<Self> {
        let details = product.details()?;
        let category = product
            .categories()
            .iter()
            .filter_map(|id| categories.get(id))
            .map(|c| c.category_name().to_string())
            .collect();

        Some(Self {
            product_id: product.id_typed(),
            name: details.name.clone(),
            brand: details.brand.clone(),
            description: details.description.clone(),
            price_in_rs: details.price_in_rs,
            quantity: details.quantity,
            weight_in_kg: details.weight_in_kg,
            manufacture_date: details.manufacture_date,
            expiry_date: details.expiry_date,
            category,
            created_at: product.created_at(),
            updated_at: product.updated_at(),
            version: product.version(),
        })
    }

    pub fn has_category_named(&self, name: &str) -> bool {
        self.category.iter().any(|c| c == name)
    }
}

/// Index categories by id for rendering.
pub fn index_categories(categories: Vec<Category>) -> HashMap<CategoryId, Category> {
    categories.into_iter().map(|c| (*c.id(), c)).collect()
}
