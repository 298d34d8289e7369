use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Event, FieldErrors};

use crate::category::CategoryId;

pub const PRICE_NEGATIVE: &str = "Price cannot be negative";
pub const EXPIRY_BEFORE_MANUFACTURE: &str = "Expiry date cannot be before manufacture date";
pub const QUANTITY_NEGATIVE: &str = "Quantity cannot be negative";

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Descriptive fields of a product (everything except identity and categories).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub brand: String,
    pub description: Option<String>,
    #[serde(rename = "price_in_RS")]
    pub price_in_rs: f64,
    pub quantity: i64,
    #[serde(rename = "weight_in_KG", default)]
    pub weight_in_kg: Option<f64>,
    pub manufacture_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

impl ProductDetails {
    /// Check the business rules, in the order clients observe them.
    ///
    /// Blank required strings are field errors; the remaining rules produce a
    /// single user-facing message.
    fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", FieldErrors::BLANK);
        }
        if self.brand.trim().is_empty() {
            errors.add("brand", FieldErrors::BLANK);
        }
        if !self.price_in_rs.is_finite() {
            errors.add("price_in_RS", "A valid number is required.");
        }
        if self.weight_in_kg.is_some_and(|w| !w.is_finite()) {
            errors.add("weight_in_KG", "A valid number is required.");
        }
        errors.into_result(())?;

        if self.price_in_rs < 0.0 {
            return Err(DomainError::validation(PRICE_NEGATIVE));
        }
        if self.expiry_date < self.manufacture_date {
            return Err(DomainError::validation(EXPIRY_BEFORE_MANUFACTURE));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation(QUANTITY_NEGATIVE));
        }
        Ok(())
    }
}

/// Aggregate root: Product.
///
/// The category association is an owned set of ids; inserting a present id or
/// removing an absent one produces no event.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    id: ProductId,
    details: Option<ProductDetails>,
    categories: BTreeSet<CategoryId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

/// Persistable state of a product (what stores read and write).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    #[serde(flatten)]
    pub details: ProductDetails,
    pub categories: BTreeSet<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            details: None,
            categories: BTreeSet::new(),
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    pub fn from_snapshot(snapshot: ProductSnapshot) -> Self {
        Self {
            id: snapshot.id,
            details: Some(snapshot.details),
            categories: snapshot.categories,
            created_at: Some(snapshot.created_at),
            updated_at: Some(snapshot.updated_at),
            version: snapshot.version,
        }
    }

    /// `None` until the product has been created.
    pub fn snapshot(&self) -> Option<ProductSnapshot> {
        Some(ProductSnapshot {
            id: self.id,
            details: self.details.clone()?,
            categories: self.categories.clone(),
            created_at: self.created_at?,
            updated_at: self.updated_at?,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.details.is_some()
    }

    pub fn details(&self) -> Option<&ProductDetails> {
        self.details.as_ref()
    }

    /// Category ids in stable (id) order.
    pub fn categories(&self) -> &BTreeSet<CategoryId> {
        &self.categories
    }

    pub fn has_category(&self, category_id: &CategoryId) -> bool {
        self.categories.contains(category_id)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
///
/// `categories` must already be resolved against the category store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub categories: Vec<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCategory {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCategory {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    AddCategory(AddCategory),
    RemoveCategory(RemoveCategory),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub categories: BTreeSet<CategoryId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAdded {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRemoved {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    CategoryAdded(CategoryAdded),
    CategoryRemoved(CategoryRemoved),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::CategoryAdded(_) => "products.product.category_added",
            ProductEvent::CategoryRemoved(_) => "products.product.category_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::CategoryAdded(e) => e.occurred_at,
            ProductEvent::CategoryRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.details = Some(e.details.clone());
                self.categories = e.categories.clone();
                self.created_at = Some(e.occurred_at);
            }
            ProductEvent::CategoryAdded(e) => {
                self.categories.insert(e.category_id);
            }
            ProductEvent::CategoryRemoved(e) => {
                self.categories.remove(&e.category_id);
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::AddCategory(cmd) => self.handle_add_category(cmd),
            ProductCommand::RemoveCategory(cmd) => self.handle_remove_category(cmd),
        }
    }
}

impl Product {
    fn ensure_exists(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.is_created() {
            return Err(DomainError::conflict("product already exists"));
        }

        cmd.details.validate()?;

        let mut details = cmd.details.clone();
        details.name = details.name.trim().to_string();
        details.brand = details.brand.trim().to_string();
        details.description = details
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            details,
            categories: cmd.categories.iter().copied().collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_category(&self, cmd: &AddCategory) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if self.has_category(&cmd.category_id) {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::CategoryAdded(CategoryAdded {
            product_id: cmd.product_id,
            category_id: cmd.category_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_category(
        &self,
        cmd: &RemoveCategory,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if !self.has_category(&cmd.category_id) {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::CategoryRemoved(CategoryRemoved {
            product_id: cmd.product_id,
            category_id: cmd.category_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
