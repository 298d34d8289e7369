//! Catalog domain module: categories, products and their association.
//!
//! This crate contains business rules for the catalog, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod category;
pub mod link;
pub mod product;

pub use category::{Category, CategoryId, NewCategory};
pub use link::CategoryAction;
pub use product::{
    AddCategory, CategoryAdded, CategoryRemoved, CreateProduct, Product, ProductCommand,
    ProductCreated, ProductDetails, ProductEvent, ProductId, ProductSnapshot, RemoveCategory,
};
