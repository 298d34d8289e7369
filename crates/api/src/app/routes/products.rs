use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product_category))
        .route("/products/:id/", get(get_product).put(update_product_category))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let input = match body.into_new_product() {
        Ok(p) => p,
        Err(fields) => return errors::field_errors(fields),
    };

    match services.catalog.create_product(input).await {
        Ok(view) => (StatusCode::CREATED, Json(dto::product_to_json(view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match services.catalog.get_product(&id).await {
        Ok(view) => (StatusCode::OK, Json(dto::product_to_json(view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListProductsQuery>,
) -> axum::response::Response {
    match services.catalog.list_products(query.category.as_deref()).await {
        Ok(views) => {
            let items = views.into_iter().map(dto::product_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

/// `PUT /products/{id}/` with `{category_id, action}`: add or remove one
/// category.
pub async fn update_product_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateProductCategoryRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let (category_id, action) = match body.into_parts() {
        Ok(parts) => parts,
        Err(fields) => return errors::field_errors(fields),
    };

    match services.catalog.link_category(&id, &category_id, &action).await {
        Ok(view) => (StatusCode::OK, Json(dto::product_to_json(view))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
