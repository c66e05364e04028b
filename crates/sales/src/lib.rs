//! Sales orders domain module.
//!
//! This crate contains the order model and its status state machine,
//! implemented purely as deterministic domain logic (no IO, no storage).
//! Stock effects of placing or cancelling an order live in the lifecycle
//! engine, which drives these types inside a store transaction.

pub mod order;
pub mod status;

pub use order::{
    LineRequest, Order, OrderLine, OrderRecord, aggregate_quantities, generate_order_number,
    validate_line_requests,
};
pub use status::{OrderStatus, StatusTransitionError, can_transition, ensure_transition};
