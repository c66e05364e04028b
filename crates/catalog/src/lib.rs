//! Catalog domain module (products and their stock levels).
//!
//! This crate contains business rules for products, implemented purely as
//! deterministic domain logic (no IO, no storage). Stock is reserved and
//! restored through [`Product::reserve`] and [`Product::restock`].

pub mod product;

pub use product::{DEFAULT_LOW_STOCK_THRESHOLD, NewProduct, Product, ProductPatch};
