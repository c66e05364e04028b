//! Infrastructure layer: persistence backends, the order lifecycle engine,
//! application services, and configuration.

pub mod catalog;
pub mod config;
pub mod customers;
pub mod error;
pub mod lifecycle;
pub mod reporting;
pub mod retry;
pub mod store;


pub use error::LifecycleError;
pub use lifecycle::OrderLifecycleEngine;
