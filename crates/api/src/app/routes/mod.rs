use axum::Router;

pub mod categories;
pub mod products;
pub mod system;

/// Router for all catalog endpoints.
pub fn router() -> Router {
    Router::new()
        .merge(categories::router())
        .merge(products::router())
}
