//! Order aggregate, lifecycle state machine and related types.

mod aggregate;
mod number;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use number::generate_order_number;
pub use state::{OrderStatus, is_valid_transition, validate_transition};
pub use value_objects::{
    OrderLineItem, OrderTotals, PaymentMethod, PaymentRecord, PaymentStatus, TrackingUpdate,
};

use thiserror::Error;

/// An order status change the lifecycle table does not allow.
///
/// Never retryable: the same request will fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid order status transition from {from} to {to}{}", context_suffix(.context))]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Usually the order number.
    pub context: Option<String>,
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}
