//! Checkout error types.

use common::OrderId;
use domain::{InvalidTransition, PricingError};
use inventory::LedgerError;
use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors returned by the order orchestrator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A referenced entity does not exist or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// A business rule rejected the request (empty cart, stock, inactive product).
    #[error("{0}")]
    Validation(String),

    /// Coupon or price rules rejected the cart.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// The requested status change is not allowed.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The order changed between read and write.
    #[error("Order {order_id} was modified concurrently")]
    ConcurrencyConflict { order_id: OrderId },

    /// Inventory ledger failure.
    #[error("Inventory error: {0}")]
    Ledger(LedgerError),

    /// Persistence failure.
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

/// Coarse classification of a [`CheckoutError`], used for responses and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::NotFound(_) => ErrorKind::NotFound,
            CheckoutError::Validation(_) | CheckoutError::Pricing(_) => ErrorKind::Validation,
            CheckoutError::InvalidTransition(_) | CheckoutError::ConcurrencyConflict { .. } => {
                ErrorKind::Conflict
            }
            CheckoutError::Ledger(_) | CheckoutError::Repository(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if retrying the same request unchanged cannot succeed.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            CheckoutError::ConcurrencyConflict { .. }
                | CheckoutError::Ledger(_)
                | CheckoutError::Repository(_)
        )
    }
}

impl From<LedgerError> for CheckoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(variant_id) => {
                CheckoutError::NotFound(format!("Variant {variant_id} not found"))
            }
            LedgerError::Inactive { sku, .. } => {
                CheckoutError::Validation(format!("Product {sku} is no longer available"))
            }
            other => CheckoutError::Ledger(other),
        }
    }
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConcurrencyConflict { order_id, .. } => {
                CheckoutError::ConcurrencyConflict { order_id }
            }
            RepositoryError::CouponExhausted(code) => {
                CheckoutError::Pricing(PricingError::UsageLimitExceeded { code })
            }
            RepositoryError::OrderNotFound(_) => CheckoutError::NotFound("Order not found".into()),
            other => CheckoutError::Repository(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
