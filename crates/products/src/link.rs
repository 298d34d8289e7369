//! Category link actions (`add` / `remove`) applied to a product's category set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::DomainError;

use crate::category::CategoryId;
use crate::product::{AddCategory, ProductCommand, ProductId, RemoveCategory};

/// A recognized mutation of a product's category set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryAction {
    Add,
    Remove,
}

impl CategoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryAction::Add => "add",
            CategoryAction::Remove => "remove",
        }
    }

    /// Build the product command this action stands for.
    pub fn command(
        self,
        product_id: ProductId,
        category_id: CategoryId,
        occurred_at: DateTime<Utc>,
    ) -> ProductCommand {
        match self {
            CategoryAction::Add => ProductCommand::AddCategory(AddCategory {
                product_id,
                category_id,
                occurred_at,
            }),
            CategoryAction::Remove => ProductCommand::RemoveCategory(RemoveCategory {
                product_id,
                category_id,
                occurred_at,
            }),
        }
    }
}

impl core::fmt::Display for CategoryAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for CategoryAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(CategoryAction::Add),
            "remove" => Ok(CategoryAction::Remove),
            other => Err(DomainError::validation(format!(
                "Invalid action \"{other}\". Use \"add\" or \"remove\"."
            ))),
        }
    }
}
