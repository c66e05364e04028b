//! `orderdesk-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, tenants and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod tenant;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, OrderId, OrderLineId, ProductId, TenantId};
pub use money::Money;
pub use tenant::{Tenant, TenantContext, TenantOwned};
pub use value_object::ValueObject;
