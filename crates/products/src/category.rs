use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{AggregateId, DomainError, Entity, FieldErrors};

/// Category identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for CategoryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Unvalidated input for category creation.
///
/// Every field is optional here so that missing values can be reported per
/// field instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub category_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// A named tag that products reference. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    id: CategoryId,
    category_name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Category {
    pub const NAME_MAX_LEN: usize = 255;

    /// Validate `input` and build a new category.
    ///
    /// All failing fields are reported together as `DomainError::Fields`.
    pub fn create(
        id: CategoryId,
        input: NewCategory,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let mut errors = FieldErrors::new();

        let category_name = match input.category_name.as_deref().map(str::trim) {
            None => {
                errors.required("category_name");
                String::new()
            }
            Some("") => {
                errors.add("category_name", FieldErrors::BLANK);
                String::new()
            }
            Some(name) if name.chars().count() > Self::NAME_MAX_LEN => {
                errors.add(
                    "category_name",
                    format!(
                        "Ensure this field has no more than {} characters.",
                        Self::NAME_MAX_LEN
                    ),
                );
                String::new()
            }
            Some(name) => name.to_string(),
        };

        let is_active = input.is_active.unwrap_or_else(|| {
            errors.required("is_active");
            false
        });

        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        errors.into_result(Self {
            id,
            category_name,
            description,
            is_active,
            created_at,
        })
        .map_err(DomainError::from)
    }

    /// Rebuild a category that was already validated and persisted.
    pub fn restore(
        id: CategoryId,
        category_name: String,
        description: Option<String>,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            category_name,
            description,
            is_active,
            created_at,
        }
    }

    pub fn id_typed(&self) -> CategoryId {
        self.id
    }

    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
