//! Parties domain module (customers).
//!
//! This crate contains business rules for the customers that place orders,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod customer;

pub use customer::{ContactInfo, Customer, CustomerPatch, NewCustomer};
