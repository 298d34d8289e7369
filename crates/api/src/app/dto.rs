use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use storefront_core::FieldErrors;
use storefront_infra::{NewProduct, ProductView};
use storefront_products::{Category, NewCategory, ProductDetails};

const DATE_FORMAT_HINT: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";

// -------------------------
// Request DTOs
// -------------------------

// Fields are optional so that missing ones are reported per field instead of
// failing the whole body.

#[derive(Debug, Default, Deserialize)]
pub struct CreateCategoryRequest {
    pub category_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl From<CreateCategoryRequest> for NewCategory {
    fn from(req: CreateCategoryRequest) -> Self {
        NewCategory {
            category_name: req.category_name,
            description: req.description,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "price_in_RS")]
    pub price_in_rs: Option<f64>,
    pub quantity: Option<i64>,
    #[serde(rename = "weight_in_KG")]
    pub weight_in_kg: Option<f64>,
    pub manufacture_date: Option<String>,
    pub expiry_date: Option<String>,
    /// Category ids. Non-string entries are kept and later reported as unknown.
    #[serde(default)]
    pub category: Vec<Value>,
}

impl CreateProductRequest {
    /// Check presence and shape of every field, collecting all problems.
    pub fn into_new_product(self) -> Result<NewProduct, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = required(&mut errors, "name", self.name);
        let brand = required(&mut errors, "brand", self.brand);
        let price_in_rs = required(&mut errors, "price_in_RS", self.price_in_rs);
        let quantity = required(&mut errors, "quantity", self.quantity);
        let manufacture_date = date(&mut errors, "manufacture_date", self.manufacture_date);
        let expiry_date = date(&mut errors, "expiry_date", self.expiry_date);

        let category = self
            .category
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        match (name, brand, price_in_rs, quantity, manufacture_date, expiry_date) {
            (Some(name), Some(brand), Some(price_in_rs), Some(quantity), Some(m), Some(e))
                if errors.is_empty() =>
            {
                Ok(NewProduct {
                    details: ProductDetails {
                        name,
                        brand,
                        description: self.description,
                        price_in_rs,
                        quantity,
                        weight_in_kg: self.weight_in_kg,
                        manufacture_date: m,
                        expiry_date: e,
                    },
                    category,
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductCategoryRequest {
    pub category_id: Option<String>,
    pub action: Option<String>,
}

impl UpdateProductCategoryRequest {
    /// Returns `(category_id, action)`.
    pub fn into_parts(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let category_id = required(&mut errors, "category_id", self.category_id);
        let action = required(&mut errors, "action", self.action);
        match (category_id, action) {
            (Some(c), Some(a)) => Ok((c, a)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub category: Option<String>,
}

fn required<T>(errors: &mut FieldErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.required(field);
    }
    value
}

fn date(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<NaiveDate> {
    let raw = required(errors, field, value)?;
    match raw.trim().parse::<NaiveDate>() {
        Ok(d) => Some(d),
        Err(_) => {
            errors.add(field, DATE_FORMAT_HINT);
            None
        }
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn category_to_json(c: &Category) -> serde_json::Value {
    serde_json::json!({
        "id": c.id_typed().to_string(),
        "category_name": c.category_name(),
        "description": c.description(),
        "is_active": c.is_active(),
        "created_at": c.created_at().to_rfc3339(),
    })
}

pub fn product_to_json(view: ProductView) -> serde_json::Value {
    serde_json::json!({
        "id": view.product_id.to_string(),
        "name": view.name,
        "brand": view.brand,
        "description": view.description,
        "price_in_RS": view.price_in_rs,
        "quantity": view.quantity,
        "weight_in_KG": view.weight_in_kg,
        "manufacture_date": view.manufacture_date.to_string(),
        "expiry_date": view.expiry_date.to_string(),
        "category": view.category,
        "created_at": view.created_at.map(|t| t.to_rfc3339()),
        "updated_at": view.updated_at.map(|t| t.to_rfc3339()),
        "version": view.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> CreateProductRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn collects_every_missing_product_field() {
        let err = request(json!({ "name": "Phone" })).into_new_product().unwrap_err();
        for field in ["brand", "price_in_RS", "quantity", "manufacture_date", "expiry_date"] {
            assert_eq!(err.messages(field), [FieldErrors::REQUIRED.to_string()], "{field}");
        }
        assert!(!err.contains("name"));
        assert!(!err.contains("category"));
    }

    #[test]
    fn rejects_badly_formatted_dates() {
        let err = request(json!({
            "name": "Phone",
            "brand": "Acme",
            "price_in_RS": 10.0,
            "quantity": 1,
            "manufacture_date": "01/02/2024",
            "expiry_date": "2025-01-01",
        }))
        .into_new_product()
        .unwrap_err();
        assert_eq!(err.messages("manufacture_date"), [DATE_FORMAT_HINT.to_string()]);
        assert!(!err.contains("expiry_date"));
    }

    #[test]
    fn category_defaults_to_empty_and_keeps_non_strings() {
        let mut body = json!({
            "name": "Phone",
            "brand": "Acme",
            "price_in_RS": -1.0,
            "quantity": 1,
            "manufacture_date": "2024-01-01",
            "expiry_date": "2025-01-01",
        });
        let p = request(body.clone()).into_new_product().unwrap();
        assert!(p.category.is_empty());
        assert_eq!(p.details.weight_in_kg, None);
        assert_eq!(p.details.price_in_rs, -1.0);

        body["category"] = json!(["abc", 7]);
        let p = request(body).into_new_product().unwrap();
        assert_eq!(p.category, vec!["abc".to_string(), "7".to_string()]);
    }

    #[test]
    fn update_request_requires_both_fields() {
        let req: UpdateProductCategoryRequest = serde_json::from_value(json!({ "action": "add" })).unwrap();
        let err = req.into_parts().unwrap_err();
        assert!(err.contains("category_id"));
        assert!(!err.contains("action"));
    }
}
