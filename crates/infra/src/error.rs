//! Caller-facing error taxonomy of the application services.

use thiserror::Error;

use orderdesk_core::{DomainError, ProductId};
use orderdesk_sales::{OrderStatus, StatusTransitionError};

use crate::store::StoreError;

/// Error returned by the lifecycle engine, the catalog and customer services,
/// and the reporting engine.
///
/// Every variant is recoverable per request; none of them leaves partial
/// writes behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Malformed input, rejected before any store work.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, or owned by another tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Uniqueness or referential conflict (duplicate SKU, record still referenced).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient store failures persisted through every retry.
    #[error("gave up after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },

    /// Non-transient backend failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether re-running the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::Store(e) => {
                e.is_transient() || matches!(e, StoreError::DuplicateOrderNumber(_))
            }
            _ => false,
        }
    }

    /// Stable snake_case code for translation at a boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "validation",
            LifecycleError::NotFound { .. } => "not_found",
            LifecycleError::InsufficientStock { .. } => "insufficient_stock",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::Conflict(_) => "conflict",
            LifecycleError::Transient { .. } => "transient",
            LifecycleError::Store(_) => "store",
        }
    }
}

impl From<DomainError> for LifecycleError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LifecycleError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                LifecycleError::Conflict(msg)
            }
            DomainError::NotFound { entity, id } => LifecycleError::NotFound { entity, id },
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => LifecycleError::InsufficientStock {
                product_id,
                requested,
                available,
            },
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => LifecycleError::NotFound { entity, id },
            StoreError::DuplicateSku(sku) => {
                LifecycleError::Conflict(format!("sku '{sku}' is already in use"))
            }
            StoreError::Conflict(msg) => LifecycleError::Conflict(msg),
            other => LifecycleError::Store(other),
        }
    }
}

impl From<StatusTransitionError> for LifecycleError {
    fn from(value: StatusTransitionError) -> Self {
        LifecycleError::InvalidTransition {
            from: value.from,
            to: value.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_transient_store_failures_and_number_collisions() {
        let transient: LifecycleError = StoreError::Deadlock("d".into()).into();
        assert!(transient.is_retryable());

        let collision: LifecycleError = StoreError::DuplicateOrderNumber("ORD".into()).into();
        assert!(collision.is_retryable());

        let backend: LifecycleError = StoreError::Backend("down".into()).into();
        assert!(!backend.is_retryable());

        let stock: LifecycleError = DomainError::InsufficientStock {
            product_id: ProductId::new(),
            requested: 2,
            available: 1,
        }
        .into();
        assert!(!stock.is_retryable());
        assert_eq!(stock.kind(), "insufficient_stock");
    }

    #[test]
    fn store_not_found_and_conflicts_map_to_business_errors() {
        let err: LifecycleError = StoreError::not_found("order", "42").into();
        assert_eq!(err, LifecycleError::not_found("order", "42"));
        assert_eq!(err.kind(), "not_found");

        let err: LifecycleError = StoreError::DuplicateSku("SKU-1".into()).into();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn transition_error_maps_to_invalid_transition() {
        let err: LifecycleError = StatusTransitionError {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Paid,
        }
        .into();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(err.to_string(), "invalid status transition from cancelled to paid");
    }
}
