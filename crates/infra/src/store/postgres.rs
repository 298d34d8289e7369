//! Postgres-backed catalog store.
//!
//! Categories and products live in their own tables; the product ↔ category
//! relation is the association table `product_categories`, whose composite
//! primary key gives set semantics.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Concurrency` (concurrent first save) |
//! | Database (other) | any | `Backend` |
//! | Decode / ColumnNotFound | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use storefront_core::{AggregateRoot, ExpectedVersion};
use storefront_products::{
    Category, CategoryId, Product, ProductDetails, ProductId, ProductSnapshot,
};

use super::{CatalogStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id            UUID PRIMARY KEY,
        category_name TEXT NOT NULL,
        description   TEXT NULL,
        is_active     BOOLEAN NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id               UUID PRIMARY KEY,
        name             TEXT NOT NULL,
        brand            TEXT NOT NULL,
        description      TEXT NULL,
        price_in_rs      DOUBLE PRECISION NOT NULL CHECK (price_in_rs >= 0),
        quantity         BIGINT NOT NULL,
        weight_in_kg     DOUBLE PRECISION NULL,
        manufacture_date DATE NOT NULL,
        expiry_date      DATE NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL,
        version          BIGINT NOT NULL,
        CHECK (expiry_date >= manufacture_date)
    )
    "#,
    "ALTER TABLE products ADD COLUMN IF NOT EXISTS weight_in_kg DOUBLE PRECISION NULL",
    r#"
    CREATE TABLE IF NOT EXISTS product_categories (
        product_id  UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
        category_id UUID NOT NULL REFERENCES categories (id),
        PRIMARY KEY (product_id, category_id)
    )
    "#,
];

const PRODUCT_COLUMNS: &str = "id, name, brand, description, price_in_rs, quantity, weight_in_kg, \
     manufacture_date, expiry_date, created_at, updated_at, version";

/// Postgres-backed catalog store.
///
/// `save_product` runs in a transaction: the product row is locked
/// (`SELECT ... FOR UPDATE`), its version compared, then the row and its
/// association rows are rewritten.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables if missing. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn category_ids_for(
        &self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, BTreeSet<CategoryId>>, StoreError> {
        let rows = sqlx::query(
            "SELECT product_id, category_id FROM product_categories WHERE product_id = ANY($1)",
        )
        .bind(product_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_categories", e))?;

        let mut by_product: HashMap<Uuid, BTreeSet<CategoryId>> = HashMap::new();
        for row in rows {
            let product_id: Uuid = row.try_get("product_id").map_err(corrupt)?;
            let category_id: Uuid = row.try_get("category_id").map_err(corrupt)?;
            by_product
                .entry(product_id)
                .or_default()
                .insert(CategoryId::new(category_id.into()));
        }
        Ok(by_product)
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, category), fields(category_id = %category.id_typed()), err)]
    async fn insert_category(&self, category: Category) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, category_name, description, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(category.id_typed().0.as_uuid())
        .bind(category.category_name())
        .bind(category.description())
        .bind(category.is_active())
        .bind(category.created_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query(
            "SELECT id, category_name, description, is_active, created_at FROM categories WHERE id = $1",
        )
        .bind(id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_category", e))?;

        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.0.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, category_name, description, is_active, created_at
            FROM categories
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_categories", e))?;

        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, category_name, description, is_active, created_at FROM categories ORDER BY id ASC",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut categories = self.category_ids_for(&[*id.0.as_uuid()]).await?;
        let set = categories.remove(id.0.as_uuid()).unwrap_or_default();
        product_from_row(&row, set).map(Some)
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(corrupt))
            .collect::<Result<Vec<_>, _>>()?;
        let mut categories = self.category_ids_for(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| product_from_row(row, categories.remove(&id).unwrap_or_default()))
            .collect()
    }

    #[instrument(
        skip(self, product),
        fields(product_id = %product.id_typed(), version = product.version()),
        err
    )]
    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let snapshot = product
            .snapshot()
            .ok_or_else(|| StoreError::Corrupt("cannot save a product that was never created".into()))?;
        let id = *snapshot.id.0.as_uuid();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM products WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_version", e))?;
        let current = stored_version(current.unwrap_or(0))?;

        if !expected.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "product {id}: expected {expected:?}, found {current}"
            )));
        }

        let details = &snapshot.details;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, brand, description, price_in_rs, quantity, weight_in_kg,
                manufacture_date, expiry_date, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                description = EXCLUDED.description,
                price_in_rs = EXCLUDED.price_in_rs,
                quantity = EXCLUDED.quantity,
                weight_in_kg = EXCLUDED.weight_in_kg,
                manufacture_date = EXCLUDED.manufacture_date,
                expiry_date = EXCLUDED.expiry_date,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            "#,
        )
        .bind(id)
        .bind(&details.name)
        .bind(&details.brand)
        .bind(details.description.as_deref())
        .bind(details.price_in_rs)
        .bind(details.quantity)
        .bind(details.weight_in_kg)
        .bind(details.manufacture_date)
        .bind(details.expiry_date)
        .bind(snapshot.created_at)
        .bind(snapshot.updated_at)
        .bind(snapshot.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;

        let category_ids: Vec<Uuid> = snapshot.categories.iter().map(|c| *c.0.as_uuid()).collect();

        sqlx::query(
            "DELETE FROM product_categories WHERE product_id = $1 AND NOT (category_id = ANY($2))",
        )
        .bind(id)
        .bind(&category_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_product_categories", e))?;

        sqlx::query(
            r#"
            INSERT INTO product_categories (product_id, category_id)
            SELECT $1, c FROM UNNEST($2::uuid[]) AS c
            ON CONFLICT (product_id, category_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&category_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product_categories", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

fn category_from_row(row: &PgRow) -> Result<Category, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;
    Ok(Category::restore(
        CategoryId::new(id.into()),
        row.try_get("category_name").map_err(corrupt)?,
        row.try_get("description").map_err(corrupt)?,
        row.try_get("is_active").map_err(corrupt)?,
        created_at,
    ))
}

fn product_from_row(row: &PgRow, categories: BTreeSet<CategoryId>) -> Result<Product, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let manufacture_date: NaiveDate = row.try_get("manufacture_date").map_err(corrupt)?;
    let expiry_date: NaiveDate = row.try_get("expiry_date").map_err(corrupt)?;
    let version: i64 = row.try_get("version").map_err(corrupt)?;

    Ok(Product::from_snapshot(ProductSnapshot {
        id: ProductId::new(id.into()),
        details: ProductDetails {
            name: row.try_get("name").map_err(corrupt)?,
            brand: row.try_get("brand").map_err(corrupt)?,
            description: row.try_get("description").map_err(corrupt)?,
            price_in_rs: row.try_get("price_in_rs").map_err(corrupt)?,
            quantity: row.try_get("quantity").map_err(corrupt)?,
            weight_in_kg: row.try_get("weight_in_kg").map_err(corrupt)?,
            manufacture_date,
            expiry_date,
        },
        categories,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
        version: stored_version(version)?,
    }))
}

fn stored_version(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative version {raw}")))
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Two first saves of the same product raced past the version check.
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        decode @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)) => StoreError::Corrupt(format!("{operation}: {decode}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_stored_version_is_corrupt() {
        assert_eq!(stored_version(0).unwrap(), 0);
        assert_eq!(stored_version(7).unwrap(), 7);
        assert!(matches!(stored_version(-1), Err(StoreError::Corrupt(_))));
    }
}
